// ABOUTME: Plan command implementation.
// ABOUTME: Prints the traffic-shift schedule the configured policy will follow.

use blueshift::error::Result;
use blueshift::output::{Output, OutputMode};
use serde::Serialize;
use std::time::Duration;

use super::release::load_settings;

#[derive(Serialize)]
struct PlanLine {
    #[serde(with = "humantime_serde")]
    offset: Duration,
    green: u8,
    blue: u8,
}

pub fn plan(output: Output) -> Result<()> {
    let settings = load_settings()?;
    let policy = settings.deploy.policy;
    let schedule = policy.schedule();

    if output.mode() == OutputMode::Json {
        for shift in &schedule {
            output.json_line(&PlanLine {
                offset: shift.offset,
                green: shift.weight.get(),
                blue: 100 - shift.weight.get(),
            });
        }
        return Ok(());
    }

    output.progress(&format!("Policy: {}", policy));
    for shift in &schedule {
        output.progress(&format!(
            "  +{:<10} green {:>3}%  blue {:>3}%",
            humantime_serde::re::humantime::format_duration(shift.offset).to_string(),
            shift.weight.get(),
            100 - shift.weight.get()
        ));
    }
    output.success(&format!(
        "Full cutover after {}, old task set terminated {} later",
        humantime_serde::re::humantime::format_duration(policy.total_duration()),
        humantime_serde::re::humantime::format_duration(settings.deploy.termination_time)
    ));
    Ok(())
}
