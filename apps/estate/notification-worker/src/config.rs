use std::path::PathBuf;
use std::sync::Arc;

use core_config::{env_parse, ConfigError, FromEnv};
use domain_notifications::templates::AssetSource;
use domain_notifications::{BundledAssets, DirectoryAssets, EvictionPolicy};

/// Where templates are seeded from and how many compiled templates to keep.
#[derive(Clone, Debug, Default)]
pub struct TemplateSettings {
    /// Read assets from this directory instead of the ones compiled into the binary
    pub assets_dir: Option<PathBuf>,
    pub cache_policy: EvictionPolicy,
}

impl TemplateSettings {
    pub fn asset_source(&self) -> Arc<dyn AssetSource> {
        match &self.assets_dir {
            Some(dir) => Arc::new(DirectoryAssets::new(dir.clone())),
            None => Arc::new(BundledAssets),
        }
    }
}

impl FromEnv for TemplateSettings {
    /// - TEMPLATE_ASSETS_DIR: optional, defaults to the bundled assets
    /// - TEMPLATE_CACHE_MAX_ENTRIES: defaults to 0 (never evict)
    fn from_env() -> Result<Self, ConfigError> {
        let assets_dir = std::env::var("TEMPLATE_ASSETS_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let cache_policy = match env_parse("TEMPLATE_CACHE_MAX_ENTRIES", 0usize)? {
            0 => EvictionPolicy::NeverEvict,
            max => EvictionPolicy::MaxEntries(max),
        };

        Ok(Self {
            assets_dir,
            cache_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_bundled_assets() {
        temp_env::with_vars(
            [
                ("TEMPLATE_ASSETS_DIR", None::<&str>),
                ("TEMPLATE_CACHE_MAX_ENTRIES", None::<&str>),
            ],
            || {
                let settings = TemplateSettings::from_env().unwrap();
                assert_eq!(settings.assets_dir, None);
                assert_eq!(settings.cache_policy, EvictionPolicy::NeverEvict);
                assert_eq!(settings.asset_source().describe(), BundledAssets.describe());
            },
        );
    }

    #[test]
    fn test_custom_directory_and_bounded_cache() {
        temp_env::with_vars(
            [
                ("TEMPLATE_ASSETS_DIR", Some("/srv/templates")),
                ("TEMPLATE_CACHE_MAX_ENTRIES", Some("32")),
            ],
            || {
                let settings = TemplateSettings::from_env().unwrap();
                assert_eq!(settings.assets_dir, Some(PathBuf::from("/srv/templates")));
                assert_eq!(settings.cache_policy, EvictionPolicy::MaxEntries(32));
            },
        );
    }

    #[test]
    fn test_invalid_cache_size() {
        temp_env::with_var("TEMPLATE_CACHE_MAX_ENTRIES", Some("lots"), || {
            let err = TemplateSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("TEMPLATE_CACHE_MAX_ENTRIES"));
        });
    }
}
