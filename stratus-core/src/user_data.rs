//! User data - Startup scripts for newly launched instances
//!
//! Every environment variable becomes two commands: an assignment for the
//! boot session and an export appended to `/etc/profile` for later shells.
//! The raw script body follows, line for line. Variables keep their declared
//! order so a later value may reference an earlier one.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Shell profile that receives persisted exports
pub const PROFILE_PATH: &str = "/etc/profile";

/// Interpreter line prepended by [`UserDataScript::render`]
const SHEBANG: &str = "#!/bin/bash";

/// Errors that can occur while reading a user data script
#[derive(Debug, Error)]
pub enum UserDataSourceError {
    #[error("Failed to read user data script {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors for entries rejected by an [`EnvironmentMap`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    #[error("Environment variable '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Invalid environment variable name '{0}'")]
    InvalidName(String),

    #[error("Environment variable '{0}' has an empty value")]
    EmptyValue(String),
}

/// Environment variables exported by user data, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentMap {
    vars: Vec<(String, String)>,
}

impl EnvironmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable, rejecting duplicates, non-identifier names and empty values
    pub fn try_insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EnvironmentError> {
        let name = name.into();
        let value = value.into();
        if !is_shell_identifier(&name) {
            return Err(EnvironmentError::InvalidName(name));
        }
        if value.is_empty() {
            return Err(EnvironmentError::EmptyValue(name));
        }
        if self.get(&name).is_some() {
            return Err(EnvironmentError::Duplicate(name));
        }
        self.vars.push((name, value));
        Ok(())
    }

    /// Build a map from pairs; the first rejected pair is returned as the error
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = Self::new();
        for (k, v) in pairs {
            env.try_insert(k, v)?;
        }
        Ok(env)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl<'de> Deserialize<'de> for EnvironmentMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EnvironmentVisitor;

        impl<'de> Visitor<'de> for EnvironmentVisitor {
            type Value = EnvironmentMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of environment variable names to string values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut env = EnvironmentMap::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    env.try_insert(name, value)
                        .map_err(<A::Error as serde::de::Error>::custom)?;
                }
                Ok(env)
            }
        }

        deserializer.deserialize_map(EnvironmentVisitor)
    }
}

/// Ordered list of user data commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDataScript {
    commands: Vec<String>,
}

impl UserDataScript {
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Render as a Linux user data script
    pub fn render(&self) -> String {
        let mut script = String::from(SHEBANG);
        for command in &self.commands {
            script.push('\n');
            script.push_str(command);
        }
        script
    }
}

/// Compose environment exports and an optional script body into user data
pub fn compose(env: &EnvironmentMap, script_lines: Option<&[String]>) -> UserDataScript {
    let script_lines = script_lines.unwrap_or_default();
    let mut commands = Vec::with_capacity(env.len() * 2 + script_lines.len());

    for (name, value) in env.iter() {
        commands.push(format!("{}={}", name, value));
        commands.push(format!("echo 'export {}={}' >> {}", name, value, PROFILE_PATH));
    }
    commands.extend(script_lines.iter().cloned());

    UserDataScript { commands }
}

/// Read a script body, one entry per line with blank lines preserved
pub fn read_script(path: &Path) -> Result<Vec<String>, UserDataSourceError> {
    let content = fs::read_to_string(path).map_err(|e| UserDataSourceError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::debug!("Read user data script {}", path.display());
    Ok(content.lines().map(str::to_string).collect())
}

/// Read the script at `path` (if any) and compose it with `env`
pub fn compose_from_path(
    env: &EnvironmentMap,
    path: Option<&Path>,
) -> Result<UserDataScript, UserDataSourceError> {
    let lines = path.map(read_script).transpose()?;
    Ok(compose(env, lines.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvironmentMap {
        EnvironmentMap::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn compose_alternates_assignment_and_export() {
        let env = env(&[("STAGE", "prod"), ("APP_PORT", "8080")]);
        let script = vec!["yum update -y".to_string(), "systemctl start app".to_string()];

        let user_data = compose(&env, Some(script.as_slice()));

        assert_eq!(user_data.len(), 2 * env.len() + script.len());
        assert_eq!(
            user_data.commands(),
            &[
                "STAGE=prod",
                "echo 'export STAGE=prod' >> /etc/profile",
                "APP_PORT=8080",
                "echo 'export APP_PORT=8080' >> /etc/profile",
                "yum update -y",
                "systemctl start app",
            ]
        );
    }

    #[test]
    fn compose_without_script() {
        let user_data = compose(&env(&[("A", "1")]), None);
        assert_eq!(user_data.commands(), &["A=1", "echo 'export A=1' >> /etc/profile"]);
    }

    #[test]
    fn compose_empty_inputs() {
        let user_data = compose(&EnvironmentMap::new(), None);
        assert!(user_data.is_empty());
        assert_eq!(user_data.render(), "#!/bin/bash");
    }

    #[test]
    fn compose_does_not_mutate_inputs() {
        let env = env(&[("A", "1")]);
        let script = vec!["echo hi".to_string()];
        let before = (env.clone(), script.clone());

        let _ = compose(&env, Some(script.as_slice()));

        assert_eq!((env, script), before);
    }

    #[test]
    fn read_script_preserves_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.sh");
        std::fs::write(&path, "echo one\n\n  echo two  \n").unwrap();

        let lines = read_script(&path).unwrap();
        assert_eq!(lines, vec!["echo one", "", "  echo two  "]);

        let user_data = compose_from_path(&env(&[("K", "v")]), Some(path.as_path())).unwrap();
        assert_eq!(user_data.len(), 5);
        assert_eq!(user_data.commands()[3], "");
    }

    #[test]
    fn read_missing_script_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_script(&dir.path().join("missing.sh"));
        assert!(matches!(result, Err(UserDataSourceError::Unreadable { .. })));
    }

    #[test]
    fn render_prefixes_shebang() {
        let script = ["echo done".to_string()];
        let user_data = compose(&env(&[("A", "1")]), Some(&script[..]));
        assert_eq!(
            user_data.render(),
            "#!/bin/bash\nA=1\necho 'export A=1' >> /etc/profile\necho done"
        );
    }

    #[test]
    fn environment_rejects_invalid_entries() {
        let mut env = EnvironmentMap::new();
        env.try_insert("NAME", "value").unwrap();
        assert_eq!(
            env.try_insert("NAME", "other"),
            Err(EnvironmentError::Duplicate("NAME".to_string()))
        );
        assert_eq!(
            env.try_insert("1BAD", "x"),
            Err(EnvironmentError::InvalidName("1BAD".to_string()))
        );
        assert_eq!(
            env.try_insert("HAS SPACE", "x"),
            Err(EnvironmentError::InvalidName("HAS SPACE".to_string()))
        );
        assert_eq!(
            env.try_insert("EMPTY", ""),
            Err(EnvironmentError::EmptyValue("EMPTY".to_string()))
        );
        assert_eq!(env.get("NAME"), Some("value"));
    }

    #[test]
    fn environment_deserialize_rejects_duplicates() {
        let ok: EnvironmentMap = serde_json::from_str(r#"{"B": "2", "A": "1"}"#).unwrap();
        assert_eq!(ok.iter().collect::<Vec<_>>(), vec![("B", "2"), ("A", "1")]);

        let dup = serde_json::from_str::<EnvironmentMap>(r#"{"A": "1", "A": "2"}"#);
        assert!(dup.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn later_variables_can_reference_earlier_ones() {
        let env: EnvironmentMap =
            serde_json::from_str(r#"{"BASE": "/opt", "APP_HOME": "$BASE/app"}"#).unwrap();

        let user_data = compose(&env, None);

        assert_eq!(user_data.commands()[0], "BASE=/opt");
        assert_eq!(user_data.commands()[2], "APP_HOME=$BASE/app");
    }
}
