//! Alarm CRUD, snooze, and dismiss commands.

use std::collections::BTreeSet;

use clap::Subcommand;
use uuid::Uuid;

use wakefund_core::{Alarm, AlarmTime};

use crate::wiring::{self, CliResult};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Create an alarm
    Add {
        /// Fire time as HH:MM (UTC)
        time: String,
        /// Display label
        #[arg(long, default_value = "Alarm")]
        label: String,
        /// Repeat weekdays, comma separated, 1 = Monday .. 7 = Sunday.
        /// Omit for a one-shot alarm.
        #[arg(long)]
        days: Option<String>,
    },
    /// List alarms, oldest first
    List,
    /// Flip an alarm's enabled state
    Toggle {
        /// Alarm id
        id: Uuid,
    },
    /// Delete an alarm
    Rm {
        /// Alarm id
        id: Uuid,
    },
}

pub fn run(action: AlarmAction) -> CliResult {
    let service = wiring::service()?;
    match action {
        AlarmAction::Add { time, label, days } => {
            let mut alarm = Alarm::new(parse_time(&time)?, label);
            if let Some(days) = days {
                alarm.repeat_days = parse_days(&days)?;
            }
            let created = service.create_alarm(alarm)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        AlarmAction::List => {
            println!("{}", serde_json::to_string_pretty(&service.list_alarms())?);
        }
        AlarmAction::Toggle { id } => match service.toggle_alarm(id) {
            Some(true) => println!("{id} enabled"),
            Some(false) => println!("{id} disabled"),
            None => return Err(format!("no alarm {id}").into()),
        },
        AlarmAction::Rm { id } => {
            service.delete_alarm(id);
            println!("{id} deleted");
        }
    }
    Ok(())
}

pub fn snooze(id: Uuid) -> CliResult {
    let service = wiring::service()?;
    let grant = service.snooze(id)?;
    println!(
        "charged {} (snooze {} today), ringing again in {} minutes",
        wiring::fmt_cents(grant.amount_cents),
        grant.snooze_count,
        grant.rearm_after_minutes
    );
    Ok(())
}

pub fn dismiss(id: Uuid) -> CliResult {
    let service = wiring::service()?;
    let summary = service.dismiss(id)?;
    if summary.clean {
        println!(
            "dismissed without snoozing: streak {} (best {})",
            summary.current_streak, summary.longest_streak
        );
    } else {
        println!("dismissed after snoozing: streak reset");
    }
    Ok(())
}

fn parse_time(s: &str) -> Result<AlarmTime, Box<dyn std::error::Error>> {
    let (hour, minute) = s.split_once(':').ok_or("time must be HH:MM")?;
    Ok(AlarmTime::new(hour.trim().parse()?, minute.trim().parse()?)?)
}

fn parse_days(s: &str) -> Result<BTreeSet<u8>, Box<dyn std::error::Error>> {
    let mut days = BTreeSet::new();
    for part in s.split(',') {
        let day: u8 = part.trim().parse()?;
        if !(1..=7).contains(&day) {
            return Err(format!("weekday {day} out of range (1 = Monday .. 7 = Sunday)").into());
        }
        days.insert(day);
    }
    Ok(days)
}
