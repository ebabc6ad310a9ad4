// ABOUTME: Compile-fail test verifying ExecutionId and DeploymentId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use blueshift::types::{DeploymentId, ExecutionId};

fn takes_execution_id(_id: ExecutionId) {}

fn main() {
    let deployment_id = DeploymentId::new("d-123");
    takes_execution_id(deployment_id); // ERROR: expected ExecutionId, found DeploymentId
}
