//! Static encounter directory.

use dispensary_core::EncounterId;
use dispensary_core::encounter::{EncounterDirectory, EncounterLookupError};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

#[derive(Clone, Debug)]
enum Mode {
    AllowAll,
    Known(HashSet<EncounterId>),
    Unavailable,
}

/// [`EncounterDirectory`] answering from a fixed configuration.
#[derive(Clone, Debug)]
pub struct StaticEncounterDirectory {
    mode: Mode,
}

impl StaticEncounterDirectory {
    /// Every encounter exists
    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            mode: Mode::AllowAll,
        }
    }

    /// Only the given encounters exist
    pub fn with_encounters(ids: impl IntoIterator<Item = EncounterId>) -> Self {
        Self {
            mode: Mode::Known(ids.into_iter().collect()),
        }
    }

    /// Every lookup fails as if the service were down
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            mode: Mode::Unavailable,
        }
    }
}

impl Default for StaticEncounterDirectory {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl EncounterDirectory for StaticEncounterDirectory {
    fn encounter_exists(
        &self,
        id: EncounterId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EncounterLookupError>> + Send + '_>> {
        let answer = match &self.mode {
            Mode::AllowAll => Ok(true),
            Mode::Known(ids) => Ok(ids.contains(&id)),
            Mode::Unavailable => Err(EncounterLookupError::Transport(
                "connection refused".to_string(),
            )),
        };
        Box::pin(async move { answer })
    }
}
