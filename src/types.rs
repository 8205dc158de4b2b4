use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

/// Width of the `action_` column.
const MAX_ACTION_LEN: usize = 255;

/// Opaque resource identifier owned by the resource registry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ResourceId(i64);

impl ResourceId {
    /// Wraps a raw resource id.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for ResourceId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ResourceId> for i64 {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

/// Name of an operation whose permission is granted or checked.
///
/// Actions are compared exactly; no trimming or case folding is applied.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Action(String);

impl Action {
    /// Creates a validated action.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(Error::InvalidAction("action must not be empty".to_string()));
        }
        if value.len() > MAX_ACTION_LEN {
            return Err(Error::InvalidAction(format!(
                "action length must be <= {MAX_ACTION_LEN}"
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Creates an action from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Action {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Action {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Action {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

/// Validates an ordered, non-empty action list.
pub(crate) fn validate_actions<A: AsRef<str>>(actions: &[A]) -> Result<Vec<Action>> {
    if actions.is_empty() {
        return Err(Error::MissingActions);
    }
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            Action::new(action.as_ref()).map_err(|err| match err {
                Error::InvalidAction(reason) => {
                    Error::InvalidAction(format!("{reason} (position {index})"))
                }
                other => other,
            })
        })
        .collect()
}

/// A stored grant: `authorized` may perform `action` on `target`.
///
/// The triple is both the permission table's primary key and the
/// permission-cache key.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionKey {
    /// Resource holding the grant.
    pub authorized: ResourceId,
    /// Resource the grant applies to.
    pub target: ResourceId,
    /// Granted action.
    pub action: Action,
}

impl PermissionKey {
    /// Creates a permission key.
    pub fn new(authorized: ResourceId, target: ResourceId, action: Action) -> Self {
        Self {
            authorized,
            target,
            action,
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{},{}}}", self.authorized, self.target, self.action)
    }
}

/// A resource together with all of its transitive ancestors.
///
/// Members keep first-discovery order and the queried resource is always
/// the first member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationScope {
    members: Vec<ResourceId>,
    seen: HashSet<ResourceId>,
}

impl AuthorizationScope {
    pub(crate) fn new(resource: ResourceId) -> Self {
        Self {
            members: vec![resource],
            seen: HashSet::from([resource]),
        }
    }

    /// Adds a member; returns `false` if it was already present.
    pub(crate) fn insert(&mut self, resource: ResourceId) -> bool {
        if !self.seen.insert(resource) {
            return false;
        }
        self.members.push(resource);
        true
    }

    /// The resource the scope was resolved for.
    pub fn resource(&self) -> ResourceId {
        self.members[0]
    }

    /// Returns whether `resource` is a member.
    pub fn contains(&self, resource: ResourceId) -> bool {
        self.seen.contains(&resource)
    }

    /// Number of members, including the resource itself.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; a scope contains at least its own resource.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates members in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.members.iter().copied()
    }

    /// Members in resolution order.
    pub fn as_slice(&self) -> &[ResourceId] {
        &self.members
    }

    /// Consumes the scope into its ordered members.
    pub fn into_vec(self) -> Vec<ResourceId> {
        self.members
    }
}

impl IntoIterator for AuthorizationScope {
    type Item = ResourceId;
    type IntoIter = std::vec::IntoIter<ResourceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
