//! Per-operation context.
//!
//! Every service function receives its collaborators explicitly: the
//! database handle, the authenticated principal, the operation timestamp,
//! and the notification transport. Nothing reads ambient session state and
//! nothing calls the clock mid-operation; `now` is stamped once at the
//! boundary so an operation sees a single consistent instant.

use chrono::{DateTime, Utc};

use crate::db::{fmt_ts, GovDb};
use crate::notify::{self, NotificationTransport, OutgoingNotification};
use crate::types::Principal;

pub struct OpCtx<'a> {
    pub db: &'a GovDb,
    pub principal: &'a Principal,
    pub now: DateTime<Utc>,
    pub transport: &'a dyn NotificationTransport,
}

impl<'a> OpCtx<'a> {
    /// The operation timestamp in storage format.
    pub fn ts(&self) -> String {
        fmt_ts(self.now)
    }

    /// Best-effort notification; failures are logged, never propagated.
    pub fn notify(&self, outgoing: OutgoingNotification<'_>) {
        notify::send(self.db, self.transport, self.now, outgoing);
    }
}
