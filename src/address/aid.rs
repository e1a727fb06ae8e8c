use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ActorError;

/// Location-transparent actor coordinate: the owning system name plus the actor name.
///
/// Both names are immutable once constructed and the hash is computed up front, so an
/// `Aid` is cheap to clone and to use as a map key on the hot path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "AidRepr", into = "AidRepr")]
pub struct Aid {
    system: Arc<str>,
    actor: Arc<str>,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct AidRepr {
    system: String,
    actor: String,
}

impl Aid {
    pub fn new(system: impl AsRef<str>, actor: impl AsRef<str>) -> Self {
        let system: Arc<str> = Arc::from(system.as_ref());
        let actor: Arc<str> = Arc::from(actor.as_ref());
        let mut hasher = DefaultHasher::new();
        system.hash(&mut hasher);
        actor.hash(&mut hasher);
        Self {
            system,
            actor,
            hash: hasher.finish(),
        }
    }

    /// The sentinel used for messages that carry no sender.
    pub fn unknown() -> Self {
        Self::new("", "")
    }

    pub fn is_unknown(&self) -> bool {
        self.system.is_empty() && self.actor.is_empty()
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

impl Default for Aid {
    fn default() -> Self {
        Self::unknown()
    }
}

impl PartialEq for Aid {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.system == other.system && self.actor == other.actor
    }
}

impl Eq for Aid {}

impl Hash for Aid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system, self.actor)
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({self})")
    }
}

impl FromStr for Aid {
    type Err = ActorError;

    /// Parses `system/actor`. The actor part may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (system, actor) = s
            .split_once('/')
            .ok_or_else(|| ActorError::InvalidAddress(s.to_string()))?;
        if system.trim().is_empty() || actor.trim().is_empty() {
            return Err(ActorError::InvalidAddress(s.to_string()));
        }
        Ok(Aid::new(system.trim(), actor.trim()))
    }
}

impl From<AidRepr> for Aid {
    fn from(repr: AidRepr) -> Self {
        Aid::new(repr.system, repr.actor)
    }
}

impl From<Aid> for AidRepr {
    fn from(aid: Aid) -> Self {
        AidRepr {
            system: aid.system.to_string(),
            actor: aid.actor.to_string(),
        }
    }
}
