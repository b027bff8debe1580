use crate::output::print_json;
use chrono::{DateTime, Utc};
use relsync_core::classifier::classify;

pub fn run(
    code_freeze: DateTime<Utc>,
    release: DateTime<Utc>,
    complete: bool,
    now: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let c = classify(code_freeze, release, complete, now.unwrap_or_else(Utc::now))?;

    if json {
        return print_json(&serde_json::json!({
            "state": c.state,
            "daysUntilCodeFreeze": c.days_until_code_freeze,
            "daysUntilRelease": c.days_until_release,
        }));
    }
    println!("{}", c.state);
    println!("  code freeze in {} day(s)", c.days_until_code_freeze);
    println!("  release in {} day(s)", c.days_until_release);
    Ok(())
}
