//! Run counters shared across the sentinel's tasks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one monitoring run. Shared behind an `Arc`; every field is
/// independently updated by whichever task owns that part of the flow.
#[derive(Debug, Default)]
pub struct SentinelStats {
    pub cycles: AtomicU64,
    pub events_emitted: AtomicU64,
    pub stage1_discarded: AtomicU64,
    pub stage1_errors: AtomicU64,
    pub stage1_flagged: AtomicU64,
    pub stage2_calls: AtomicU64,
    pub stage2_failures: AtomicU64,
    pub cache_hits: AtomicU64,
    pub users_clean: AtomicU64,
    pub users_confirmed: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub alert_failures: AtomicU64,
    pub mentions_seen: AtomicU64,
}

impl SentinelStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for SentinelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Sentinel Run ===")?;
        writeln!(f, "Poll cycles:        {}", Self::read(&self.cycles))?;
        writeln!(f, "Events emitted:     {}", Self::read(&self.events_emitted))?;
        writeln!(f, "Stage-1 discarded:  {}", Self::read(&self.stage1_discarded))?;
        writeln!(f, "Stage-1 errors:     {}", Self::read(&self.stage1_errors))?;
        writeln!(f, "Stage-1 flagged:    {}", Self::read(&self.stage1_flagged))?;
        writeln!(f, "Stage-2 calls:      {}", Self::read(&self.stage2_calls))?;
        writeln!(f, "Stage-2 failures:   {}", Self::read(&self.stage2_failures))?;
        writeln!(f, "Cache hits:         {}", Self::read(&self.cache_hits))?;
        writeln!(f, "Users clean:        {}", Self::read(&self.users_clean))?;
        writeln!(f, "Users confirmed:    {}", Self::read(&self.users_confirmed))?;
        writeln!(f, "Alerts sent:        {}", Self::read(&self.alerts_sent))?;
        writeln!(f, "Alert failures:     {}", Self::read(&self.alert_failures))?;
        writeln!(f, "Mentions seen:      {}", Self::read(&self.mentions_seen))?;
        Ok(())
    }
}
