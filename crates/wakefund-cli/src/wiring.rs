//! Service construction for the CLI process.

use std::io::{self, Write as _};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use wakefund_core::{
    AlarmId, AlarmService, AlertingBackend, Authorization, BackendKind, ChargeOutcome, Config,
    FireSpec, PaymentAuthority, ScheduleError, SchedulingCoordinator, SqliteStore,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// The terminal has no system alarm center; primary authorization is
/// always denied, routing every alarm to the console backend.
struct NoSystemBackend;

impl AlertingBackend for NoSystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
    }
    fn request_authorization(&self) -> Authorization {
        Authorization::Denied
    }
    fn schedule(&self, _spec: &FireSpec) -> Result<(), ScheduleError> {
        Err(ScheduleError::BackendUnavailable("no system alarm center".into()))
    }
    fn cancel(&self, _alarm_id: AlarmId) {}
    fn snooze(&self, _alarm_id: AlarmId, _rearm_after: chrono::Duration) -> Result<(), ScheduleError> {
        Ok(())
    }
    fn stop(&self, _alarm_id: AlarmId) {}
}

/// Fallback backend for terminal sessions. A short-lived process cannot
/// hold a timer, so registrations only log the next fire instant.
struct ConsoleBackend;

impl AlertingBackend for ConsoleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }
    fn request_authorization(&self) -> Authorization {
        Authorization::Granted
    }
    fn schedule(&self, spec: &FireSpec) -> Result<(), ScheduleError> {
        info!(alarm_id = %spec.alarm_id, at = %spec.at, "alarm registered");
        Ok(())
    }
    fn cancel(&self, _alarm_id: AlarmId) {}
    fn snooze(&self, alarm_id: AlarmId, rearm_after: chrono::Duration) -> Result<(), ScheduleError> {
        info!(%alarm_id, minutes = rearm_after.num_minutes(), "re-alert countdown started");
        Ok(())
    }
    fn stop(&self, _alarm_id: AlarmId) {}
}

/// Confirms each charge on stdin. Anything other than `y` cancels.
struct ConsolePayment;

impl PaymentAuthority for ConsolePayment {
    fn charge(&self, amount_cents: i64) -> ChargeOutcome {
        print!("donate {} to snooze? [y/N] ", fmt_cents(amount_cents));
        if io::stdout().flush().is_err() {
            return ChargeOutcome::Unknown;
        }
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(_) if line.trim().eq_ignore_ascii_case("y") => ChargeOutcome::Success,
            Ok(_) => ChargeOutcome::Cancelled,
            Err(_) => ChargeOutcome::Unknown,
        }
    }
}

pub fn fmt_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

/// Build the service over the on-disk store, console backend, and the
/// stdin payment prompt.
pub fn service() -> Result<Arc<AlarmService>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    config.validate()?;
    let store = Arc::new(SqliteStore::open()?);
    let (events, _) = broadcast::channel(256);
    let coordinator = Arc::new(SchedulingCoordinator::new(
        Arc::new(NoSystemBackend),
        Arc::new(ConsoleBackend),
        events.clone(),
    ));
    let service = AlarmService::new(
        store,
        &config,
        coordinator,
        Arc::new(ConsolePayment),
        events,
    )?;
    Ok(Arc::new(service))
}
