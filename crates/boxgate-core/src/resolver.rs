//! User-path resolver
//!
//! API callers see paths relative to their own root (`""` is the root,
//! everything else starts with `/`). Drivers see backend-global paths below
//! `/<account_id>[/<app_id>]`.

use crate::{CoreError, Result};
use boxgate_driver::{path, Entry};

/// The namespace one caller is confined to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserScope {
    account_id: String,
    app_id: Option<String>,
    root: String,
}

impl UserScope {
    pub fn new(account_id: impl Into<String>, app_id: Option<String>) -> Result<Self> {
        let account_id = account_id.into();
        validate_id(&account_id)?;
        if let Some(app_id) = &app_id {
            validate_id(app_id)?;
        }
        let root = match &app_id {
            Some(app) => format!("/{account_id}/{app}"),
            None => format!("/{account_id}"),
        };
        Ok(Self {
            account_id,
            app_id,
            root,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Backend-global path of this scope's root
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Key identifying the owner of jobs and sessions
    pub fn owner_key(&self) -> &str {
        &self.root
    }

    /// Translate an API path into a backend-global one
    pub fn to_global(&self, user_path: &str) -> Result<String> {
        if !user_path.is_empty() && !user_path.starts_with('/') {
            return Err(CoreError::MalformedPath(format!(
                "path must be empty or start with '/': {user_path}"
            )));
        }
        let normalized = path::normalize(user_path);
        if path::is_root(&normalized) {
            return Ok(self.root.clone());
        }
        Ok(path::join(&self.root, &normalized))
    }

    /// Translate a backend-global path back into API form; `None` when the
    /// path lies outside this scope
    pub fn to_user_path(&self, global: &str) -> Option<String> {
        let global = path::normalize(global);
        let root_lower = self.root.to_lowercase();
        let global_lower = global.to_lowercase();
        if global_lower == root_lower {
            return Some(String::new());
        }
        if !path::is_strict_descendant(&global_lower, &root_lower) {
            return None;
        }
        global.get(self.root.len()..).map(str::to_string)
    }

    /// Rewrite an entry's paths relative to this scope
    pub fn to_user_entry(&self, entry: Entry) -> Entry {
        match self.to_user_path(&entry.path_display) {
            Some(user_path) => {
                let name = entry.name.clone();
                let mut entry = entry.relocated(user_path);
                // The scope root shows up as "" but keeps its own name
                if entry.path_display.is_empty() {
                    entry.name = name;
                }
                entry
            }
            None => entry,
        }
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(CoreError::MalformedPath(format!("invalid scope id: {id:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn scope() -> UserScope {
        UserScope::new("dbid-1", Some("notes".into())).unwrap()
    }

    #[rstest]
    #[case("", "/dbid-1/notes")]
    #[case("/", "/dbid-1/notes")]
    #[case("/Docs/a.txt", "/dbid-1/notes/Docs/a.txt")]
    #[case("/../../other/secret", "/dbid-1/notes/other/secret")]
    #[case("/a\\b//c/./d", "/dbid-1/notes/a/b/c/d")]
    fn test_to_global(#[case] user: &str, #[case] global: &str) {
        assert_eq!(scope().to_global(user).unwrap(), global);
    }

    #[test]
    fn test_relative_path_is_malformed() {
        assert!(matches!(
            scope().to_global("docs"),
            Err(CoreError::MalformedPath(_))
        ));
    }

    #[rstest]
    #[case("/dbid-1/notes", Some(""))]
    #[case("/dbid-1/notes/Docs/a.txt", Some("/Docs/a.txt"))]
    #[case("/DBID-1/Notes/x", Some("/x"))]
    #[case("/dbid-1/notesy/x", None)]
    #[case("/dbid-2/notes/x", None)]
    fn test_to_user_path(#[case] global: &str, #[case] user: Option<&str>) {
        assert_eq!(scope().to_user_path(global).as_deref(), user);
    }

    #[test]
    fn test_to_user_entry() {
        let entry = Entry::file("/dbid-1/notes/Docs/A.txt", 1, Utc::now());
        let user = scope().to_user_entry(entry);
        assert_eq!(user.path_display, "/Docs/A.txt");
        assert_eq!(user.path_lower, "/docs/a.txt");
        assert_eq!(user.id, "/Docs/A.txt");
        assert_eq!(user.name, "A.txt");
    }

    #[test]
    fn test_scope_without_app() {
        let scope = UserScope::new("acc", None).unwrap();
        assert_eq!(scope.root(), "/acc");
        assert_eq!(scope.to_global("/x").unwrap(), "/acc/x");
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("a/b")]
    #[case("a\\b")]
    fn test_invalid_ids(#[case] id: &str) {
        assert!(UserScope::new(id, None).is_err());
        assert!(UserScope::new("ok", Some(id.to_string())).is_err());
    }
}
