use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::SessionError;
use crate::mac::MacAddress;
use crate::AccessControl;

/// Where an address-level session observation came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Arp,
    Nd,
    Radius,
    Dhcp,
}

impl fmt::Display for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionSource::Arp => "arp",
            SessionSource::Nd => "nd",
            SessionSource::Radius => "radius",
            SessionSource::Dhcp => "dhcp",
        };
        f.write_str(name)
    }
}

impl FromStr for SessionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arp" => Ok(SessionSource::Arp),
            "nd" => Ok(SessionSource::Nd),
            "radius" => Ok(SessionSource::Radius),
            "dhcp" => Ok(SessionSource::Dhcp),
            other => Err(format!("unknown session source {other:?}")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSessionId(u64);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserSessionId(u64);

impl fmt::Display for AddressSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observed presence of a MAC at a network layer. Open while `end` is
/// unset; rows are closed, never deleted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddressSession {
    pub id: AddressSessionId,
    pub mac: MacAddress,
    pub source: SessionSource,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub user_session: Option<UserSessionId>,
}

impl AddressSession {
    fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Identity while open is the (source, mac, ipv4, ipv6) tuple.
    fn matches_identity(
        &self,
        source: SessionSource,
        mac: MacAddress,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> bool {
        self.source == source && self.mac == mac && self.ipv4 == ipv4 && self.ipv6 == ipv6
    }
}

/// A portal login interval. At most one open row per (user, mac).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserSession {
    pub id: UserSessionId,
    pub user: String,
    pub mac: MacAddress,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl UserSession {
    fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// One line of the observability listing: an address session left-joined to
/// its (possibly absent) user session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionRow {
    pub user: Option<String>,
    pub mac: MacAddress,
    pub user_start: Option<NaiveDateTime>,
    pub user_end: Option<NaiveDateTime>,
    pub source: SessionSource,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub addr_start: NaiveDateTime,
    pub addr_end: Option<NaiveDateTime>,
}

/// Append-mostly session tables. Ids grow monotonically; closing a row sets
/// its end timestamp, preserving the audit trail.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionStore {
    addr_sessions: Vec<AddressSession>,
    user_sessions: Vec<UserSession>,
    next_addr_id: u64,
    next_user_id: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    fn insert_user_session(
        &mut self,
        user: &str,
        mac: MacAddress,
        start: NaiveDateTime,
    ) -> UserSessionId {
        let id = UserSessionId(self.next_user_id);
        self.next_user_id += 1;
        self.user_sessions.push(UserSession {
            id,
            user: user.to_string(),
            mac,
            start,
            end: None,
        });
        id
    }

    fn insert_addr_session(
        &mut self,
        mac: MacAddress,
        source: SessionSource,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
        start: NaiveDateTime,
        user_session: Option<UserSessionId>,
    ) -> AddressSessionId {
        let id = AddressSessionId(self.next_addr_id);
        self.next_addr_id += 1;
        self.addr_sessions.push(AddressSession {
            id,
            mac,
            source,
            ipv4,
            ipv6,
            start,
            end: None,
            user_session,
        });
        id
    }

    fn open_user_session(&self, user: &str, mac: MacAddress) -> Option<&UserSession> {
        self.user_sessions
            .iter()
            .find(|u| u.is_open() && u.user == user && u.mac == mac)
    }

    fn user_session(&self, id: UserSessionId) -> Option<&UserSession> {
        self.user_sessions.iter().find(|u| u.id == id)
    }

    /// Open user sessions for a MAC, most recently started first.
    fn open_user_sessions_for_mac(&self, mac: MacAddress) -> Vec<UserSessionId> {
        let mut open: Vec<&UserSession> = self
            .user_sessions
            .iter()
            .filter(|u| u.is_open() && u.mac == mac)
            .collect();
        open.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
        open.iter().map(|u| u.id).collect()
    }

    /// Closes every open address session matching the identity tuple and
    /// returns the closed rows.
    fn close_matching_addr_sessions(
        &mut self,
        source: SessionSource,
        mac: MacAddress,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
        end: NaiveDateTime,
    ) -> Vec<AddressSession> {
        let mut closed = Vec::new();
        for sess in self
            .addr_sessions
            .iter_mut()
            .filter(|s| s.is_open() && s.matches_identity(source, mac, ipv4, ipv6))
        {
            sess.end = Some(end);
            closed.push(sess.clone());
        }
        closed
    }

    /// Points open address sessions for `mac` at the new user session.
    /// Sessions already linked to a different still-open user session are
    /// left alone; stale links to closed sessions are superseded.
    ///
    /// Returns (linked, retained).
    fn adopt_open_addr_sessions(
        &mut self,
        mac: MacAddress,
        new_id: UserSessionId,
    ) -> (usize, usize) {
        let open_user_ids: HashSet<UserSessionId> = self
            .user_sessions
            .iter()
            .filter(|u| u.is_open())
            .map(|u| u.id)
            .collect();
        let mut linked = 0;
        let mut retained = 0;
        for sess in self
            .addr_sessions
            .iter_mut()
            .filter(|s| s.is_open() && s.mac == mac)
        {
            match sess.user_session {
                Some(existing) if existing != new_id && open_user_ids.contains(&existing) => {
                    retained += 1;
                }
                _ => {
                    sess.user_session = Some(new_id);
                    linked += 1;
                }
            }
        }
        (linked, retained)
    }

    fn open_addr_count(&self, user_session: UserSessionId, sources: &[SessionSource]) -> usize {
        self.addr_sessions
            .iter()
            .filter(|s| {
                s.is_open() && s.user_session == Some(user_session) && sources.contains(&s.source)
            })
            .count()
    }

    fn user_session_open(&self, id: UserSessionId) -> bool {
        self.user_session(id).map(|u| u.is_open()).unwrap_or(false)
    }

    /// Closes the user session and returns its MAC, or None if it was
    /// already closed or unknown.
    fn close_user_session(&mut self, id: UserSessionId, end: NaiveDateTime) -> Option<MacAddress> {
        let sess = self
            .user_sessions
            .iter_mut()
            .find(|u| u.id == id && u.is_open())?;
        sess.end = Some(end);
        Some(sess.mac)
    }

    /// Left join of address sessions to their user sessions, most recently
    /// started address session first.
    pub fn rows(&self) -> Vec<SessionRow> {
        let mut rows: Vec<SessionRow> = self
            .addr_sessions
            .iter()
            .rev()
            .map(|a| {
                let user = a.user_session.and_then(|id| self.user_session(id));
                SessionRow {
                    user: user.map(|u| u.user.clone()),
                    mac: a.mac,
                    user_start: user.map(|u| u.start),
                    user_end: user.and_then(|u| u.end),
                    source: a.source,
                    ipv4: a.ipv4,
                    ipv6: a.ipv6,
                    addr_start: a.start,
                    addr_end: a.end,
                }
            })
            .collect();
        // Stable sort keeps newest ids first among equal start times.
        rows.sort_by(|a, b| b.addr_start.cmp(&a.addr_start));
        rows
    }
}

/// The session correlation engine.
///
/// Every operation takes the store lock exactly once for its whole body, so
/// operations are serialized and each one is all-or-nothing with respect to
/// concurrent readers.
pub struct SessionEngine {
    store: Mutex<SessionStore>,
    access: Arc<dyn AccessControl>,
    presence_sources: Vec<SessionSource>,
}

impl SessionEngine {
    pub fn new(access: Arc<dyn AccessControl>, presence_sources: Vec<SessionSource>) -> Self {
        SessionEngine::with_store(SessionStore::new(), access, presence_sources)
    }

    /// Resumes from a previously persisted store snapshot.
    pub fn with_store(
        store: SessionStore,
        access: Arc<dyn AccessControl>,
        presence_sources: Vec<SessionSource>,
    ) -> Self {
        SessionEngine {
            store: Mutex::new(store),
            access,
            presence_sources,
        }
    }

    /// Clone of the current store state, for persistence.
    pub async fn snapshot(&self) -> SessionStore {
        self.store.lock().await.clone()
    }

    /// Records a portal login and grants the MAC network access.
    ///
    /// The grant goes out before any store mutation: if enforcement fails
    /// the caller gets the error and the store shows no trace of the login.
    pub async fn login(
        &self,
        user: &str,
        mac: MacAddress,
        time: NaiveDateTime,
    ) -> Result<UserSessionId, SessionError> {
        let mut store = self.store.lock().await;
        if let Some(existing) = store.open_user_session(user, mac) {
            return Err(SessionError::AlreadyLoggedIn {
                user: user.to_string(),
                mac,
                since: existing.start,
            });
        }
        self.access.grant(mac).await?;
        let id = store.insert_user_session(user, mac, time);
        let (linked, retained) = store.adopt_open_addr_sessions(mac, id);
        if retained > 0 {
            warn!(
                "{} open address sessions for {} remain linked to other open user sessions",
                retained, mac
            );
        }
        info!(
            "added user session {} for {}/{}, matched {} address sessions",
            id, user, mac, linked
        );
        Ok(id)
    }

    /// Records an address session. If one is already open with the same
    /// identity it is defensively closed first, so there is at least a
    /// record that it got reopened.
    pub async fn address_session_started(
        &self,
        source: SessionSource,
        mac: MacAddress,
        time: NaiveDateTime,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> AddressSessionId {
        let mut store = self.store.lock().await;
        let stale = store.close_matching_addr_sessions(source, mac, ipv4, ipv6, time);
        if !stale.is_empty() {
            warn!(
                "closed {} existing {} sessions for {} {:?} {:?}",
                stale.len(),
                source,
                mac,
                ipv4,
                ipv6
            );
        }
        let open_users = store.open_user_sessions_for_mac(mac);
        if open_users.len() > 1 {
            warn!(
                "more than one open user session for {}, linking the most recent",
                mac
            );
        }
        let user_session = open_users.first().copied();
        let id = store.insert_addr_session(mac, source, ipv4, ipv6, time, user_session);
        info!(
            "session from {} started at {}: {} {:?} {:?} (matched with user session {:?})",
            source, time, mac, ipv4, ipv6, user_session
        );
        id
    }

    /// Records an address session ending and applies the revocation rule:
    /// a user session with no remaining open presence-source address
    /// sessions is closed and its MAC revoked.
    pub async fn address_session_ended(
        &self,
        source: SessionSource,
        mac: MacAddress,
        time: NaiveDateTime,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) {
        let mut store = self.store.lock().await;
        let closed = store.close_matching_addr_sessions(source, mac, ipv4, ipv6, time);
        if closed.is_empty() {
            warn!(
                "no open {} session for {} {:?} {:?} to end",
                source, mac, ipv4, ipv6
            );
            return;
        }
        if closed.len() > 1 {
            warn!(
                "more than one {} session open for {} {:?} {:?}, closing all of them",
                source, mac, ipv4, ipv6
            );
        }
        let mut user_ids: Vec<UserSessionId> =
            closed.iter().filter_map(|s| s.user_session).collect();
        user_ids.sort();
        user_ids.dedup();
        if user_ids.len() > 1 {
            error!("multiple user sessions referenced by one session identity");
        }
        for uid in user_ids {
            if !store.user_session_open(uid) {
                continue;
            }
            if store.open_addr_count(uid, &self.presence_sources) > 0 {
                continue;
            }
            if let Some(user_mac) = store.close_user_session(uid, time) {
                info!("user session {} ended, revoking access for {}", uid, user_mac);
                // The session is over either way; enforcement catches up
                // when it comes back.
                if let Err(e) = self.access.revoke(user_mac).await {
                    error!("failed to revoke {}: {}", user_mac, e);
                }
            }
        }
    }

    /// Observability listing, most recently started first.
    pub async fn list_sessions(&self) -> Vec<SessionRow> {
        self.store.lock().await.rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnforcementFailure;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct NullAccess;

    #[async_trait]
    impl AccessControl for NullAccess {
        async fn grant(&self, _mac: MacAddress) -> Result<(), EnforcementFailure> {
            Ok(())
        }
        async fn revoke(&self, _mac: MacAddress) -> Result<(), EnforcementFailure> {
            Ok(())
        }
    }

    fn t(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 6)
            .unwrap()
            .and_hms_opt(12, 0, secs)
            .unwrap()
    }

    fn mac1() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    #[tokio::test]
    async fn store_snapshot_survives_serde() {
        let engine = SessionEngine::new(
            Arc::new(NullAccess),
            vec![SessionSource::Arp, SessionSource::Nd],
        );
        engine
            .address_session_started(
                SessionSource::Arp,
                mac1(),
                t(0),
                Some("10.0.0.1".parse().unwrap()),
                None,
            )
            .await;
        engine.login("alice", mac1(), t(1)).await.unwrap();

        let snapshot = engine.snapshot().await;
        let json = serde_json::to_vec(&snapshot).unwrap();
        let restored: SessionStore = serde_json::from_slice(&json).unwrap();
        let rows = restored.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user.as_deref(), Some("alice"));
        assert_eq!(rows[0].mac, mac1());
    }

    #[tokio::test]
    async fn listing_orders_newest_first() {
        let engine = SessionEngine::new(Arc::new(NullAccess), vec![SessionSource::Arp]);
        engine
            .address_session_started(SessionSource::Arp, mac1(), t(0), None, None)
            .await;
        engine
            .address_session_started(
                SessionSource::Nd,
                mac1(),
                t(5),
                None,
                Some("fe80::1".parse().unwrap()),
            )
            .await;
        let rows = engine.list_sessions().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, SessionSource::Nd);
        assert_eq!(rows[1].source, SessionSource::Arp);
    }
}
