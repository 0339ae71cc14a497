//! User-defined command macros.
//!
//! Macro files are YAML documents in the macros directory:
//!
//! ```yaml
//! version: "1"
//! domains: [example.com]
//! macro:
//!   login:
//!     - 'send {"user": "{{0}}", "password": "{{1}}"}'
//!     - wait 5
//! ```
//!
//! A file is loaded only when one of its domains is a suffix of the host the
//! session is connected to. A file without domains applies to every host.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::factory::VERBS;
use crate::error::{Error, Result};

pub const MACRO_VERSION: &str = "1";

/// Nesting limit for macros that expand into other macros.
pub const MAX_MACRO_DEPTH: usize = 16;

#[derive(Debug, Deserialize)]
pub struct MacroConfig {
    pub version: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default, rename = "macro")]
    pub macros: BTreeMap<String, Vec<String>>,
}

impl MacroConfig {
    pub fn applies_to(&self, hostname: &str) -> bool {
        self.domains.is_empty() || self.domains.iter().any(|d| hostname.ends_with(d.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Arg(usize),
    AllArgs,
}

/// One macro line with `{{N}}` and `{{args}}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidMacroTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| invalid("unclosed placeholder"))?;
            let name = after[..close].trim();
            segments.push(match name {
                "args" => Segment::AllArgs,
                n => Segment::Arg(
                    n.parse()
                        .map_err(|_| invalid(&format!("unknown placeholder {n:?}")))?,
                ),
            });
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Substitutes `args` into the template. `name` is only used in errors.
    pub fn render(&self, name: &str, args: &[&str]) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::AllArgs => out.push_str(&args.join(" ")),
                Segment::Arg(index) => {
                    let arg = args.get(*index).ok_or_else(|| Error::MissingMacroArg {
                        name: name.to_string(),
                        index: *index,
                    })?;
                    out.push_str(arg);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct MacroRepo {
    macros: BTreeMap<String, Vec<Template>>,
}

impl MacroRepo {
    /// Loads every `.yaml`/`.yml` file in `dir` that applies to `hostname`.
    ///
    /// A missing directory yields an empty repository.
    pub fn load_from_dir(dir: &Path, hostname: &str) -> Result<Self> {
        let mut repo = Self::default();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no macros directory");
            return Ok(repo);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read macros directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: MacroConfig = serde_yaml::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            if config.version != MACRO_VERSION {
                return Err(Error::UnsupportedMacroVersion(config.version));
            }
            if !config.applies_to(hostname) {
                debug!(path = %path.display(), hostname, "macro file skipped for host");
                continue;
            }
            repo.add_config(config)?;
            info!(path = %path.display(), "macros loaded");
        }
        Ok(repo)
    }

    pub fn add_config(&mut self, config: MacroConfig) -> Result<()> {
        if config.version != MACRO_VERSION {
            return Err(Error::UnsupportedMacroVersion(config.version));
        }
        for (name, lines) in config.macros {
            if lines.is_empty() {
                return Err(Error::EmptyMacro(name));
            }
            if self.macros.contains_key(&name) {
                return Err(Error::DuplicateMacro(name));
            }
            if VERBS.contains(&name.as_str()) {
                warn!(name, "macro shadowed by built-in command");
            }
            let templates = lines
                .iter()
                .map(String::as_str)
                .map(Template::parse)
                .collect::<Result<Vec<_>>>()?;
            self.macros.insert(name, templates);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[Template]> {
        self.macros.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> MacroConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_template_render() {
        let t = Template::parse("send {{0}} to {{ 1 }} ({{args}})").unwrap();
        assert_eq!(t.render("m", &["a", "b"]).unwrap(), "send a to b (a b)");
    }

    #[test]
    fn test_template_without_placeholders() {
        let t = Template::parse("send {\"a\": {\"b\": 1}}").unwrap();
        assert_eq!(t.render("m", &[]).unwrap(), "send {\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_template_errors() {
        assert!(matches!(
            Template::parse("send {{0"),
            Err(Error::InvalidMacroTemplate { .. })
        ));
        assert!(matches!(
            Template::parse("send {{name}}"),
            Err(Error::InvalidMacroTemplate { .. })
        ));
        let t = Template::parse("{{2}}").unwrap();
        assert!(matches!(
            t.render("m", &["x"]),
            Err(Error::MissingMacroArg { index: 2, .. })
        ));
    }

    #[test]
    fn test_version_checked() {
        let mut repo = MacroRepo::default();
        let result = repo.add_config(config("version: \"2\"\nmacro:\n  a: [exit]\n"));
        assert!(matches!(result, Err(Error::UnsupportedMacroVersion(v)) if v == "2"));
    }

    #[test]
    fn test_empty_macro_rejected() {
        let mut repo = MacroRepo::default();
        let result = repo.add_config(config("version: \"1\"\nmacro:\n  a: []\n"));
        assert!(matches!(result, Err(Error::EmptyMacro(n)) if n == "a"));
    }

    #[test]
    fn test_duplicate_across_files() {
        let mut repo = MacroRepo::default();
        repo.add_config(config("version: \"1\"\nmacro:\n  a: [exit]\n"))
            .unwrap();
        let result = repo.add_config(config("version: \"1\"\nmacro:\n  a: [editcmd]\n"));
        assert!(matches!(result, Err(Error::DuplicateMacro(n)) if n == "a"));
    }

    #[test]
    fn test_domain_matching() {
        let c = config("version: \"1\"\ndomains: [example.com]\n");
        assert!(c.applies_to("api.example.com"));
        assert!(c.applies_to("example.com"));
        assert!(!c.applies_to("example.org"));
        assert!(config("version: \"1\"\n").applies_to("anything"));
    }

    #[test]
    fn test_load_from_dir_filters_by_host() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("a.yaml"),
            "version: \"1\"\ndomains: [example.com]\nmacro:\n  hi: [send hi]\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("b.yml"),
            "version: \"1\"\ndomains: [other.net]\nmacro:\n  bye: [send bye]\n",
        )
        .unwrap();
        fs::write(tmp.path().join("notes.txt"), "not yaml").unwrap();

        let repo = MacroRepo::load_from_dir(tmp.path(), "ws.example.com").unwrap();
        assert_eq!(repo.names().collect::<Vec<_>>(), vec!["hi"]);
    }

    #[test]
    fn test_load_from_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = MacroRepo::load_from_dir(&tmp.path().join("nope"), "host").unwrap();
        assert!(repo.is_empty());
    }

    #[test]
    fn test_load_reports_bad_version_even_for_other_hosts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("a.yaml"),
            "version: \"0\"\ndomains: [other.net]\n",
        )
        .unwrap();
        assert!(matches!(
            MacroRepo::load_from_dir(tmp.path(), "example.com"),
            Err(Error::UnsupportedMacroVersion(_))
        ));
    }
}
