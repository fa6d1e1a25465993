//! Anonymous Firebase session state
//!
//! ```text
//!  Unauthenticated --sign-up ok--> Ready
//!  Unauthenticated --sign-up failed--> Disabled (terminal)
//!  Ready --token expired / 401 / 403--> Unauthenticated
//! ```

use alloc::string::String;

use log::{info, warn};

/// Tokens are considered expired this many seconds before the server says so
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Ready,
    /// Sign-up failed; no further uploads for the lifetime of the process
    Disabled,
}

/// A state change, reported to whoever caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    pub const fn changed(&self) -> bool {
        !matches!(
            (self.from, self.to),
            (SessionState::Unauthenticated, SessionState::Unauthenticated)
                | (SessionState::Ready, SessionState::Ready)
                | (SessionState::Disabled, SessionState::Disabled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id_token: String,
    /// Uptime second at which the token stops being accepted
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    credentials: Option<Credentials>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            credentials: None,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready)
    }

    /// ID token to attach to database requests, only while `Ready`
    pub fn id_token(&self) -> Option<&str> {
        match (self.state, &self.credentials) {
            (SessionState::Ready, Some(credentials)) => Some(credentials.id_token.as_str()),
            _ => None,
        }
    }

    fn move_to(&mut self, to: SessionState) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
        };
        if transition.changed() {
            info!("Session {:?} -> {:?}", transition.from, transition.to);
        }
        self.state = to;
        if to != SessionState::Ready {
            self.credentials = None;
        }
        transition
    }

    /// Record a successful sign-up. A disabled session stays disabled.
    pub fn signed_up(&mut self, credentials: Credentials) -> Transition {
        if self.state == SessionState::Disabled {
            return self.move_to(SessionState::Disabled);
        }
        self.credentials = Some(credentials);
        self.move_to(SessionState::Ready)
    }

    /// Record a failed sign-up; logging stays off from here on.
    pub fn sign_up_failed(&mut self) -> Transition {
        warn!("Sign-up failed, uploads disabled until restart");
        self.move_to(SessionState::Disabled)
    }

    /// Drop back to `Unauthenticated` once the token is (nearly) expired.
    pub fn expire_if_due(&mut self, now_secs: u64) -> Option<Transition> {
        let expires_at = self.credentials.as_ref()?.expires_at;
        if self.state == SessionState::Ready
            && now_secs.saturating_add(EXPIRY_MARGIN_SECS) >= expires_at
        {
            return Some(self.move_to(SessionState::Unauthenticated));
        }
        None
    }

    /// The server rejected our token.
    pub fn invalidate(&mut self) -> Option<Transition> {
        if self.state == SessionState::Ready {
            return Some(self.move_to(SessionState::Unauthenticated));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(expires_at: u64) -> Credentials {
        Credentials {
            id_token: String::from("token"),
            expires_at,
        }
    }

    #[test]
    fn test_sign_up_success() {
        let mut session = Session::new();
        assert_eq!(session.id_token(), None);

        let t = session.signed_up(credentials(3600));
        assert_eq!(
            t,
            Transition {
                from: SessionState::Unauthenticated,
                to: SessionState::Ready
            }
        );
        assert_eq!(session.id_token(), Some("token"));
    }

    #[test]
    fn test_sign_up_failure_is_terminal() {
        let mut session = Session::new();
        let t = session.sign_up_failed();
        assert_eq!(t.to, SessionState::Disabled);

        let t = session.signed_up(credentials(3600));
        assert!(!t.changed());
        assert_eq!(session.state(), SessionState::Disabled);
        assert_eq!(session.id_token(), None);
    }

    #[test]
    fn test_expiry_with_margin() {
        let mut session = Session::new();
        session.signed_up(credentials(3600));

        assert_eq!(session.expire_if_due(3500), None);
        let t = session.expire_if_due(3540).unwrap();
        assert_eq!(t.to, SessionState::Unauthenticated);
        assert_eq!(session.id_token(), None);
        assert_eq!(session.expire_if_due(4000), None);
    }

    #[test]
    fn test_invalidate_only_from_ready() {
        let mut session = Session::new();
        assert_eq!(session.invalidate(), None);

        session.signed_up(credentials(3600));
        assert!(session.invalidate().is_some());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }
}
