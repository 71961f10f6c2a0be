//! Scheduled batch jobs.
//!
//! A scheduler tick names one job. `run_job` executes a single tick and returns its
//! report; `spawn_all` launches the daemon loops that tick each job on its configured
//! interval. Both jobs are idempotent, so ticking more often than the business cadence
//! (quarterly, daily) is safe.

use crate::{
    config::{ScheduleSettings, TierConfig},
    core::{
        credit::{AllocationReport, allocate_quarterly_credits},
        expiration::{ExpirationReport, expire_due},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Jobs the scheduler can tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobName {
    /// Quarterly credit and voucher allocation
    AllocateCredits,
    /// Credit and voucher expiration sweep
    ExpireCredits,
}

impl JobName {
    /// Name used on the command line and in scheduler events
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllocateCredits => "allocate-credits",
            Self::ExpireCredits => "expire-credits",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "allocate-credits" => Ok(Self::AllocateCredits),
            "expire-credits" => Ok(Self::ExpireCredits),
            other => Err(Error::malformed(format!("unknown job: {other}"))),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    /// Report of an allocation run
    Allocation(AllocationReport),
    /// Report of an expiration sweep
    Expiration(ExpirationReport),
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation(r) => write!(
                f,
                "allocation {}: {} granted, {} already allocated, {} not entitled, {} vouchers, \
                 {} failed",
                r.period,
                r.granted,
                r.already_allocated,
                r.not_entitled,
                r.vouchers_granted,
                r.failed
            ),
            Self::Expiration(r) => write!(
                f,
                "expiration: {} credits, {} vouchers expired, {} failed",
                r.credits_expired, r.vouchers_expired, r.failed
            ),
        }
    }
}

/// Runs one tick of `job`.
pub async fn run_job(
    db: &DatabaseConnection,
    tiers: &[TierConfig],
    job: JobName,
) -> Result<JobReport> {
    info!(%job, "Running job");
    let now = Utc::now();
    match job {
        JobName::AllocateCredits => allocate_quarterly_credits(db, tiers, now)
            .await
            .map(JobReport::Allocation),
        JobName::ExpireCredits => expire_due(db, now).await.map(JobReport::Expiration),
    }
}

/// Spawns one loop per job. Each loop runs immediately, then sleeps for its interval.
///
/// The loops never return; abort the handles to stop them.
pub fn spawn_all(
    db: DatabaseConnection,
    tiers: Arc<Vec<TierConfig>>,
    schedule: &ScheduleSettings,
) -> Vec<JoinHandle<()>> {
    [
        (JobName::AllocateCredits, schedule.allocation_interval_secs),
        (JobName::ExpireCredits, schedule.expiration_interval_secs),
    ]
    .into_iter()
    .map(|(job, interval_secs)| {
        let db = db.clone();
        let tiers = Arc::clone(&tiers);
        tokio::spawn(async move {
            loop {
                match run_job(&db, &tiers, job).await {
                    Ok(report) => info!(%job, "{report}"),
                    Err(e) => error!(%job, error = %e, "Job failed to start"),
                }
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            }
        })
    })
    .collect()
}
