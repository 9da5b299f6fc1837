//! Template asset bundles.
//!
//! A bundle is a set of `<name>.hbs` HTML bodies, each with an optional
//! `<name>.json` sidecar (`{"subject": "...", "text": "..."}`), plus shared
//! partials under `partials/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NotificationError, NotificationResult};

const BODY_EXTENSION: &str = "hbs";
const SIDECAR_EXTENSION: &str = "json";
const PARTIALS_DIR: &str = "partials";

/// One template's raw files. Either half may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub name: String,
    pub body: Option<String>,
    pub sidecar: Option<String>,
}

/// Raw contents of an asset source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBundle {
    /// Ordered by template name
    pub templates: Vec<AssetFile>,
    /// `(partial name, source)`
    pub partials: Vec<(String, String)>,
}

impl AssetBundle {
    /// Names that have an HTML body.
    pub fn template_names(&self) -> Vec<String> {
        self.templates
            .iter()
            .filter(|file| file.body.is_some())
            .map(|file| file.name.clone())
            .collect()
    }
}

/// Where bundled templates come from.
pub trait AssetSource: Send + Sync {
    fn load(&self) -> NotificationResult<AssetBundle>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Assets held in memory; also the shape of the compiled-in bundle.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    templates: BTreeMap<String, AssetFile>,
    partials: BTreeMap<String, String>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: &str, body: &str, sidecar: Option<&str>) -> Self {
        let file = self.entry(name);
        file.body = Some(body.to_string());
        file.sidecar = sidecar.map(str::to_string);
        self
    }

    /// A sidecar with no body; the seeder skips these.
    pub fn with_orphan_sidecar(mut self, name: &str, sidecar: &str) -> Self {
        self.entry(name).sidecar = Some(sidecar.to_string());
        self
    }

    pub fn with_partial(mut self, name: &str, source: &str) -> Self {
        self.partials.insert(name.to_string(), source.to_string());
        self
    }

    fn entry(&mut self, name: &str) -> &mut AssetFile {
        self.templates
            .entry(name.to_string())
            .or_insert_with(|| AssetFile {
                name: name.to_string(),
                body: None,
                sidecar: None,
            })
    }
}

impl AssetSource for MemoryAssets {
    fn load(&self) -> NotificationResult<AssetBundle> {
        Ok(AssetBundle {
            templates: self.templates.values().cloned().collect(),
            partials: self
                .partials
                .iter()
                .map(|(name, source)| (name.clone(), source.clone()))
                .collect(),
        })
    }

    fn describe(&self) -> String {
        format!("in-memory ({} templates)", self.templates.len())
    }
}

macro_rules! bundled_template {
    ($name:literal) => {
        (
            $name,
            include_str!(concat!("../../assets/templates/", $name, ".hbs")),
            include_str!(concat!("../../assets/templates/", $name, ".json")),
        )
    };
}

const BUNDLED_TEMPLATES: &[(&str, &str, &str)] = &[
    bundled_template!("welcome"),
    bundled_template!("password-reset"),
    bundled_template!("invoice"),
    bundled_template!("payment-receipt"),
    bundled_template!("rent-reminder"),
    bundled_template!("lease-signature-request"),
    bundled_template!("lease-expiring"),
    bundled_template!("lease-terminated"),
    bundled_template!("maintenance-update"),
];

const BUNDLED_PARTIALS: &[(&str, &str)] = &[(
    "layout",
    include_str!("../../assets/templates/partials/layout.hbs"),
)];

/// Templates compiled into the binary.
pub struct BundledAssets;

impl BundledAssets {
    pub fn to_memory() -> MemoryAssets {
        let assets = BUNDLED_TEMPLATES
            .iter()
            .fold(MemoryAssets::new(), |assets, (name, body, sidecar)| {
                assets.with_template(name, body, Some(sidecar))
            });
        BUNDLED_PARTIALS
            .iter()
            .fold(assets, |assets, (name, source)| assets.with_partial(name, source))
    }
}

impl AssetSource for BundledAssets {
    fn load(&self) -> NotificationResult<AssetBundle> {
        Self::to_memory().load()
    }

    fn describe(&self) -> String {
        "bundled".to_string()
    }
}

/// Assets read from a directory laid out like the bundled set.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir(path: &Path) -> NotificationResult<Vec<PathBuf>> {
        let entries = fs::read_dir(path)
            .map_err(|e| NotificationError::Assets(format!("{}: {}", path.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NotificationError::Assets(e.to_string()))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn read_file(path: &Path) -> NotificationResult<String> {
        fs::read_to_string(path)
            .map_err(|e| NotificationError::Assets(format!("{}: {}", path.display(), e)))
    }
}

impl AssetSource for DirectoryAssets {
    fn load(&self) -> NotificationResult<AssetBundle> {
        let mut assets = MemoryAssets::new();

        for path in Self::read_dir(&self.root)? {
            if !path.is_file() {
                continue;
            }
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };

            match ext {
                BODY_EXTENSION => assets.entry(stem).body = Some(Self::read_file(&path)?),
                SIDECAR_EXTENSION => assets.entry(stem).sidecar = Some(Self::read_file(&path)?),
                _ => {}
            }
        }

        let partials_dir = self.root.join(PARTIALS_DIR);
        if partials_dir.is_dir() {
            for path in Self::read_dir(&partials_dir)? {
                if path.extension().and_then(|s| s.to_str()) != Some(BODY_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let source = Self::read_file(&path)?;
                    assets = assets.with_partial(stem, &source);
                }
            }
        }

        assets.load()
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_assets_complete() {
        let bundle = BundledAssets.load().unwrap();
        let names = bundle.template_names();

        assert_eq!(names.len(), BUNDLED_TEMPLATES.len());
        assert!(names.contains(&"welcome".to_string()));
        assert!(names.contains(&"password-reset".to_string()));
        assert!(bundle.templates.iter().all(|f| f.sidecar.is_some()));
        assert_eq!(bundle.partials.len(), 1);
        assert_eq!(bundle.partials[0].0, "layout");
    }

    #[test]
    fn test_bundled_sidecars_are_valid_json() {
        for (name, _, sidecar) in BUNDLED_TEMPLATES {
            let value: serde_json::Value = serde_json::from_str(sidecar)
                .unwrap_or_else(|e| panic!("{} sidecar: {}", name, e));
            assert!(value["subject"].is_string(), "{} has no subject", name);
        }
    }

    #[test]
    fn test_memory_assets_orphan_sidecar_has_no_body() {
        let bundle = MemoryAssets::new()
            .with_template("a", "<p>a</p>", None)
            .with_orphan_sidecar("b", r#"{"subject":"B"}"#)
            .load()
            .unwrap();

        assert_eq!(bundle.templates.len(), 2);
        assert_eq!(bundle.template_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_directory_assets_match_bundle() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/templates");
        let from_disk = DirectoryAssets::new(root).load().unwrap();
        let bundled = BundledAssets.load().unwrap();

        assert_eq!(from_disk, bundled);
    }

    #[test]
    fn test_directory_assets_missing_dir() {
        let err = DirectoryAssets::new("/definitely/not/here").load().unwrap_err();
        assert!(matches!(err, NotificationError::Assets(_)));
    }
}
