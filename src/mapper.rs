//! Source-to-destination name mapping.
//!
//! A [`NameMapper`] turns one source name (relative, `/`-separated) into zero
//! or more destination names. `None` means the mapper does not handle the
//! name at all; the batch runner skips such sources silently.
//!
//! ## Rules
//!
//! | `type` | Result |
//! |---|---|
//! | `identity` | the name unchanged (default when no mapper is configured) |
//! | `flatten` | the file name without directories |
//! | `merge` | always `to` |
//! | `glob` | `from = "*.jpg"`, `to = "*.png"`: the `*` part carries over |
//! | `regex` | `from` is searched in the name, `to` may reference groups as `\0`–`\9` |
//! | `composite` | union of every nested mapper's results (fan-out) |
//! | `chained` | each nested mapper is applied to the previous one's results |
//!
//! Only one mapper may be configured per run; [`MapperSlot`] enforces that.

use crate::config::ConfigError;
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Maps a source name to its destination names.
pub trait NameMapper: Send + Sync {
    fn map(&self, source: &str) -> Option<Vec<String>>;
}

/// `a/b.png` → `a/b.png`
pub struct IdentityMapper;

impl NameMapper for IdentityMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        Some(vec![source.to_string()])
    }
}

/// `a/b.png` → `b.png`
pub struct FlattenMapper;

impl NameMapper for FlattenMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        let name = source.rsplit('/').next().unwrap_or(source);
        Some(vec![name.to_string()])
    }
}

/// Everything → `to`
pub struct MergeMapper {
    to: String,
}

impl NameMapper for MergeMapper {
    fn map(&self, _source: &str) -> Option<Vec<String>> {
        Some(vec![self.to.clone()])
    }
}

/// Single-`*` glob rename.
///
/// Without a `*` in `from` the name must match exactly. Without a `*` in
/// `to` every match maps to `to` verbatim.
pub struct GlobMapper {
    from_prefix: String,
    from_postfix: Option<String>,
    to_prefix: String,
    to_postfix: Option<String>,
    case_sensitive: bool,
}

impl GlobMapper {
    pub fn new(from: &str, to: &str, case_sensitive: bool) -> Result<Self, ConfigError> {
        let split = |pattern: &str, key: &str| -> Result<(String, Option<String>), ConfigError> {
            if pattern.matches('*').count() > 1 {
                return Err(ConfigError::Validation(format!(
                    "glob mapper '{key}' may contain at most one '*': {pattern}"
                )));
            }
            Ok(match pattern.split_once('*') {
                Some((prefix, postfix)) => (prefix.to_string(), Some(postfix.to_string())),
                None => (pattern.to_string(), None),
            })
        };
        let (from_prefix, from_postfix) = split(from, "from")?;
        let (to_prefix, to_postfix) = split(to, "to")?;
        Ok(Self {
            from_prefix,
            from_postfix,
            to_prefix,
            to_postfix,
            case_sensitive,
        })
    }

    /// The part of `source` matched by `*`, if the pattern matches at all.
    fn variable_part<'a>(&self, source: &'a str) -> Option<&'a str> {
        let fold = |s: &str| {
            if self.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let name = fold(source);
        let prefix = fold(&self.from_prefix);
        let Some(postfix) = &self.from_postfix else {
            return (name == prefix).then_some("");
        };
        let postfix = fold(postfix);
        // lowercase can change byte lengths; bail out rather than slice wrongly
        if name.len() != source.len()
            || name.len() < prefix.len() + postfix.len()
            || !name.starts_with(&prefix)
            || !name.ends_with(&postfix)
        {
            return None;
        }
        source.get(prefix.len()..source.len() - postfix.len())
    }
}

impl NameMapper for GlobMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        let variable = self.variable_part(source)?;
        let mapped = match &self.to_postfix {
            Some(postfix) => format!("{}{}{}", self.to_prefix, variable, postfix),
            None => self.to_prefix.clone(),
        };
        Some(vec![mapped])
    }
}

/// Regex rename: `to` is a template, not a substitution into the source.
pub struct RegexMapper {
    regex: Regex,
    to: String,
}

impl RegexMapper {
    pub fn new(from: &str, to: &str, case_sensitive: bool) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(from)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self {
            regex,
            to: to.to_string(),
        })
    }
}

/// Expand `\N` group references; `\\` is a literal backslash.
fn expand_template(template: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    chars.next();
                    let group = d.to_digit(10).unwrap_or(0) as usize;
                    out.push_str(caps.get(group).map_or("", |m| m.as_str()));
                    continue;
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

impl NameMapper for RegexMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(source)?;
        Some(vec![expand_template(&self.to, &caps)])
    }
}

/// Union of every nested mapper's results, first occurrence wins the order.
pub struct CompositeMapper {
    mappers: Vec<Box<dyn NameMapper>>,
}

impl NameMapper for CompositeMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for name in self.mappers.iter().filter_map(|m| m.map(source)).flatten() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        (!names.is_empty()).then_some(names)
    }
}

/// Pipes names through each nested mapper in turn.
pub struct ChainedMapper {
    mappers: Vec<Box<dyn NameMapper>>,
}

impl NameMapper for ChainedMapper {
    fn map(&self, source: &str) -> Option<Vec<String>> {
        let mut names = vec![source.to_string()];
        for mapper in &self.mappers {
            names = names
                .iter()
                .filter_map(|n| mapper.map(n))
                .flatten()
                .collect();
            if names.is_empty() {
                return None;
            }
        }
        Some(names)
    }
}

fn default_true() -> bool {
    true
}

/// Job-file form of a mapper, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum MapperSpec {
    Identity,
    Flatten,
    Merge {
        to: String,
    },
    Glob {
        from: String,
        to: String,
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
    Regex {
        from: String,
        to: String,
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
    Composite {
        mappers: Vec<MapperSpec>,
    },
    Chained {
        mappers: Vec<MapperSpec>,
    },
}

impl MapperSpec {
    /// Parse the CLI shorthand `FROM=TO` into a glob mapper.
    pub fn parse_glob_shorthand(value: &str) -> Result<Self, ConfigError> {
        let (from, to) = value.split_once('=').ok_or_else(|| {
            ConfigError::Validation(format!("expected FROM=TO mapping, got '{value}'"))
        })?;
        Ok(MapperSpec::Glob {
            from: from.to_string(),
            to: to.to_string(),
            case_sensitive: true,
        })
    }

    pub fn build(&self) -> Result<Box<dyn NameMapper>, ConfigError> {
        let build_all = |specs: &[MapperSpec]| -> Result<Vec<Box<dyn NameMapper>>, ConfigError> {
            if specs.is_empty() {
                return Err(ConfigError::Validation(
                    "composite and chained mappers need at least one nested mapper".into(),
                ));
            }
            specs.iter().map(MapperSpec::build).collect()
        };

        let mapper: Box<dyn NameMapper> = match self {
            MapperSpec::Identity => Box::new(IdentityMapper),
            MapperSpec::Flatten => Box::new(FlattenMapper),
            MapperSpec::Merge { to } => Box::new(MergeMapper { to: to.clone() }),
            MapperSpec::Glob {
                from,
                to,
                case_sensitive,
            } => Box::new(GlobMapper::new(from, to, *case_sensitive)?),
            MapperSpec::Regex {
                from,
                to,
                case_sensitive,
            } => Box::new(RegexMapper::new(from, to, *case_sensitive)?),
            MapperSpec::Composite { mappers } => Box::new(CompositeMapper {
                mappers: build_all(mappers)?,
            }),
            MapperSpec::Chained { mappers } => Box::new(ChainedMapper {
                mappers: build_all(mappers)?,
            }),
        };
        Ok(mapper)
    }
}

/// Holds the run's single mapper configuration.
#[derive(Debug, Clone, Default)]
pub struct MapperSlot {
    spec: Option<MapperSpec>,
}

impl MapperSlot {
    /// Configure the mapper. A second call is a configuration error.
    pub fn configure(&mut self, spec: MapperSpec) -> Result<(), ConfigError> {
        if self.spec.is_some() {
            return Err(ConfigError::DuplicateMapper);
        }
        self.spec = Some(spec);
        Ok(())
    }

    pub fn spec(&self) -> Option<&MapperSpec> {
        self.spec.as_ref()
    }

    /// Build the configured mapper, or the identity mapper if none was set.
    pub fn build(&self) -> Result<Box<dyn NameMapper>, ConfigError> {
        match &self.spec {
            Some(spec) => spec.build(),
            None => Ok(Box::new(IdentityMapper)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(spec: MapperSpec, name: &str) -> Option<Vec<String>> {
        spec.build().unwrap().map(name)
    }

    fn glob(from: &str, to: &str) -> MapperSpec {
        MapperSpec::Glob {
            from: from.into(),
            to: to.into(),
            case_sensitive: true,
        }
    }

    #[test]
    fn identity_returns_name() {
        assert_eq!(
            IdentityMapper.map("dir/a.png"),
            Some(vec!["dir/a.png".to_string()])
        );
    }

    #[test]
    fn flatten_strips_directories() {
        assert_eq!(
            map(MapperSpec::Flatten, "x/y/a.png"),
            Some(vec!["a.png".to_string()])
        );
        assert_eq!(map(MapperSpec::Flatten, "a.png"), Some(vec!["a.png".to_string()]));
    }

    #[test]
    fn merge_maps_everything_to_one_name() {
        let spec = MapperSpec::Merge {
            to: "all.png".into(),
        };
        assert_eq!(map(spec.clone(), "a.jpg"), Some(vec!["all.png".to_string()]));
        assert_eq!(map(spec, "b/c.gif"), Some(vec!["all.png".to_string()]));
    }

    #[test]
    fn glob_renames_extension() {
        assert_eq!(
            map(glob("*.jpg", "*.png"), "photos/a.jpg"),
            Some(vec!["photos/a.png".to_string()])
        );
    }

    #[test]
    fn glob_unmatched_is_absent() {
        assert_eq!(map(glob("*.jpg", "*.png"), "a.gif"), None);
    }

    #[test]
    fn glob_without_star_requires_exact_match() {
        let spec = glob("logo.png", "brand/logo.png");
        assert_eq!(map(spec.clone(), "logo.png"), Some(vec!["brand/logo.png".to_string()]));
        assert_eq!(map(spec, "logo.png.bak"), None);
    }

    #[test]
    fn glob_with_prefix_and_postfix() {
        assert_eq!(
            map(glob("raw-*.tif", "web/*-small.png"), "raw-042.tif"),
            Some(vec!["web/042-small.png".to_string()])
        );
        // prefix and postfix must not overlap
        assert_eq!(map(glob("ab*ba", "*"), "aba"), None);
    }

    #[test]
    fn glob_case_insensitive() {
        let spec = MapperSpec::Glob {
            from: "*.JPG".into(),
            to: "*.png".into(),
            case_sensitive: false,
        };
        assert_eq!(map(spec, "Cat.jpg"), Some(vec!["Cat.png".to_string()]));
    }

    #[test]
    fn glob_rejects_two_stars() {
        assert!(matches!(
            glob("*a*", "*").build(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn regex_expands_groups() {
        let spec = MapperSpec::Regex {
            from: r"^(.*)/(\d+)\.jpe?g$".into(),
            to: r"\1/thumb-\2.png".into(),
            case_sensitive: true,
        };
        assert_eq!(
            map(spec.clone(), "album/0042.jpeg"),
            Some(vec!["album/thumb-0042.png".to_string()])
        );
        assert_eq!(map(spec, "album/cover.jpg"), None);
    }

    #[test]
    fn regex_whole_match_and_literal_backslash() {
        let spec = MapperSpec::Regex {
            from: r"[a-z]+".into(),
            to: r"\0\\x".into(),
            case_sensitive: true,
        };
        assert_eq!(map(spec, "42abc7"), Some(vec![r"abc\x".to_string()]));
    }

    #[test]
    fn regex_invalid_pattern_is_config_error() {
        let spec = MapperSpec::Regex {
            from: "(".into(),
            to: "x".into(),
            case_sensitive: true,
        };
        assert!(matches!(spec.build(), Err(ConfigError::InvalidRegex(_))));
    }

    #[test]
    fn composite_fans_out_and_dedupes() {
        let spec = MapperSpec::Composite {
            mappers: vec![
                MapperSpec::Identity,
                glob("*.png", "*.webp"),
                MapperSpec::Identity,
            ],
        };
        assert_eq!(
            map(spec.clone(), "a.png"),
            Some(vec!["a.png".to_string(), "a.webp".to_string()])
        );
        assert_eq!(map(spec, "a.gif"), Some(vec!["a.gif".to_string()]));
    }

    #[test]
    fn composite_with_no_results_is_absent() {
        let spec = MapperSpec::Composite {
            mappers: vec![glob("*.png", "*.webp")],
        };
        assert_eq!(map(spec, "a.gif"), None);
    }

    #[test]
    fn chained_pipes_results() {
        let spec = MapperSpec::Chained {
            mappers: vec![MapperSpec::Flatten, glob("*.jpg", "small-*.png")],
        };
        assert_eq!(
            map(spec.clone(), "deep/dir/a.jpg"),
            Some(vec!["small-a.png".to_string()])
        );
        assert_eq!(map(spec, "deep/dir/a.gif"), None);
    }

    #[test]
    fn empty_composite_is_config_error() {
        let spec = MapperSpec::Composite { mappers: vec![] };
        assert!(matches!(spec.build(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn slot_defaults_to_identity() {
        let slot = MapperSlot::default();
        assert!(slot.spec().is_none());
        assert_eq!(slot.build().unwrap().map("a"), Some(vec!["a".to_string()]));
    }

    #[test]
    fn slot_rejects_second_mapper() {
        let mut slot = MapperSlot::default();
        slot.configure(MapperSpec::Flatten).unwrap();
        let err = slot.configure(glob("*", "*")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMapper));
        assert_eq!(slot.spec(), Some(&MapperSpec::Flatten));
    }

    #[test]
    fn shorthand_parses_glob() {
        assert_eq!(
            MapperSpec::parse_glob_shorthand("*.jpg=*.png").unwrap(),
            glob("*.jpg", "*.png")
        );
        assert!(MapperSpec::parse_glob_shorthand("*.jpg").is_err());
    }

    #[test]
    fn spec_deserializes_from_toml() {
        let spec: MapperSpec = toml::from_str(
            r#"
type = "composite"
mappers = [
    { type = "identity" },
    { type = "glob", from = "*.png", to = "*.webp" },
]
"#,
        )
        .unwrap();
        assert!(matches!(spec, MapperSpec::Composite { ref mappers } if mappers.len() == 2));
    }
}
