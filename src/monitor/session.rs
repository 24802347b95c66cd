//! Workstation lock state.

/// Whether the interactive session is currently locked.
pub trait SessionLock: Send + Sync {
    fn is_locked(&self) -> bool;
}

/// For platforms without a lock probe: always reports unlocked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverLocked;

impl SessionLock for NeverLocked {
    fn is_locked(&self) -> bool {
        false
    }
}

#[cfg(target_os = "linux")]
pub use linux::LogindSession;

#[cfg(target_os = "linux")]
mod linux {
    use std::sync::Mutex;

    use tracing::trace;
    use zbus::zvariant::OwnedObjectPath;

    use super::SessionLock;

    const LOGIND: &str = "org.freedesktop.login1";
    const MANAGER_PATH: &str = "/org/freedesktop/login1";
    const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
    const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
    /// logind's alias for the caller's own session.
    const AUTO_SESSION_PATH: &str = "/org/freedesktop/login1/session/auto";

    /// Reads the session's `LockedHint` from logind over the system bus.
    /// Any bus or logind error reads as unlocked.
    pub struct LogindSession {
        session_id: Option<String>,
        proxy: Mutex<Option<zbus::Proxy<'static>>>,
    }

    impl LogindSession {
        pub fn new(session_id: Option<String>) -> Self {
            Self {
                session_id,
                proxy: Mutex::new(None),
            }
        }

        /// Uses `XDG_SESSION_ID` when set, else logind's `auto` session.
        pub fn from_environment() -> Self {
            Self::new(std::env::var("XDG_SESSION_ID").ok())
        }

        async fn connect(&self) -> zbus::Result<zbus::Proxy<'static>> {
            let conn = zbus::Connection::system().await?;
            let path = match &self.session_id {
                Some(id) => {
                    let manager =
                        zbus::Proxy::new(&conn, LOGIND, MANAGER_PATH, MANAGER_INTERFACE).await?;
                    let reply = manager.call_method("GetSession", &(id.as_str(),)).await?;
                    reply.body().deserialize::<OwnedObjectPath>()?
                }
                None => OwnedObjectPath::try_from(AUTO_SESSION_PATH)?,
            };
            trace!(path = path.as_str(), "logind session resolved");
            zbus::Proxy::new_owned(conn, LOGIND, path.into_inner(), SESSION_INTERFACE).await
        }

        async fn locked_hint(&self) -> zbus::Result<bool> {
            let cached = self.proxy.lock().ok().and_then(|p| p.clone());
            let proxy = match cached {
                Some(proxy) => proxy,
                None => {
                    let proxy = self.connect().await?;
                    if let Ok(mut slot) = self.proxy.lock() {
                        *slot = Some(proxy.clone());
                    }
                    proxy
                }
            };

            let locked = proxy.get_property::<bool>("LockedHint").await;
            if locked.is_err() {
                // Reconnect on the next call
                if let Ok(mut slot) = self.proxy.lock() {
                    *slot = None;
                }
            }
            locked
        }
    }

    impl SessionLock for LogindSession {
        /// Blocks on the bus round trip; call from a blocking worker inside
        /// a tokio runtime.
        fn is_locked(&self) -> bool {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                trace!("no runtime for the logind query");
                return false;
            };
            match handle.block_on(self.locked_hint()) {
                Ok(locked) => locked,
                Err(e) => {
                    trace!("logind LockedHint unavailable: {}", e);
                    false
                }
            }
        }
    }

}

#[cfg(target_os = "linux")]
pub fn platform_session_lock() -> Box<dyn SessionLock> {
    Box::new(LogindSession::from_environment())
}

#[cfg(not(target_os = "linux"))]
pub fn platform_session_lock() -> Box<dyn SessionLock> {
    Box::new(NeverLocked)
}
