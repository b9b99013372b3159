//! Upload session identity and lifecycle.
//!
//! ## Session lifecycle
//!
//! ```text
//! (created)          -> AwaitingSdp
//! SDP banner         -> Streaming
//! end of stream      -> Completed   (sink flushed)
//! protocol/source    -> Aborted
//! sink returns false -> Cancelled
//! ```

use std::fmt;

use crate::error::{IngestError, Result};

/// Metadata key carrying the user id.
pub const USER_KEY: &str = "user";
/// Metadata key carrying the camera id.
pub const CAMERA_KEY: &str = "camera";

/// The (user, camera) pair an upload belongs to.
///
/// Fixed for the lifetime of a pipeline; storage groups output under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub user: String,
    pub camera: String,
}

impl SessionIdentity {
    pub fn new(user: impl Into<String>, camera: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            camera: camera.into(),
        }
    }

    /// Extract the identity from transport metadata pairs.
    ///
    /// The first non-blank value for each key wins.
    ///
    /// ```
    /// use ingest::session::SessionIdentity;
    ///
    /// let id = SessionIdentity::from_metadata([("user", "u1"), ("camera", "cam-7")]).unwrap();
    /// assert_eq!(id.storage_key(), "u1/cam-7");
    ///
    /// assert!(SessionIdentity::from_metadata([("user", "u1")]).is_err());
    /// ```
    pub fn from_metadata<'a, I>(metadata: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut user = None;
        let mut camera = None;
        for (key, value) in metadata {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                USER_KEY if user.is_none() => user = Some(value.to_string()),
                CAMERA_KEY if camera.is_none() => camera = Some(value.to_string()),
                _ => {}
            }
        }
        let user = user.ok_or(IngestError::MissingIdentity(USER_KEY))?;
        let camera = camera.ok_or(IngestError::MissingIdentity(CAMERA_KEY))?;
        Ok(Self { user, camera })
    }

    /// `user/camera`, the key storage organizes output under.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.user, self.camera)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user={} camera={}", self.user, self.camera)
    }
}

/// Ingestion session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No frame consumed yet; the next one must be the SDP banner.
    AwaitingSdp,
    /// Banner accepted; RTP/RTCP frames are being ingested.
    Streaming,
    /// Source reached end of stream and the sink was flushed.
    Completed,
    /// A protocol violation or source error ended the session.
    Aborted,
    /// The sink declined further units.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }
}
