//! Who may act on an owned entity

/// Owners a caller may act for.
///
/// Administrators act for anyone. Everyone else acts for themselves and
/// the organisations they administer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOwners {
    Any,
    Only(Vec<String>),
}

impl AllowedOwners {
    pub fn only<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        AllowedOwners::Only(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, AllowedOwners::Any)
    }

    pub fn permits(&self, owner: &str) -> bool {
        match self {
            AllowedOwners::Any => true,
            AllowedOwners::Only(ids) => ids.iter().any(|id| id == owner),
        }
    }

    /// Ids to filter listings by; `None` means no restriction
    pub fn ids(&self) -> Option<&[String]> {
        match self {
            AllowedOwners::Any => None,
            AllowedOwners::Only(ids) => Some(ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits() {
        assert!(AllowedOwners::Any.permits("usr_x"));
        let owners = AllowedOwners::only(["usr_a", "org_b"]);
        assert!(owners.permits("org_b"));
        assert!(!owners.permits("usr_x"));
        assert!(!AllowedOwners::only(Vec::<String>::new()).permits("usr_a"));
    }
}
