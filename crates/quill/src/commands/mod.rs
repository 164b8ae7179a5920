//! CLI command implementations.

pub(crate) mod cache;
pub(crate) mod check;
pub(crate) mod render;

pub(crate) use cache::CacheCommand;
pub(crate) use check::CheckArgs;
pub(crate) use render::RenderArgs;

use quill_cache::{CacheStore, FileStore, NullStore};
use quill_compile::CompilationCache;
use quill_config::{ComponentConfig, Config};
use quill_render::{ComponentInfo, SpacingRules};

/// Open the compilation cache configured by `[cache]` and `[compile]`.
///
/// A disabled cache still deduplicates within the run but never persists.
pub(crate) fn open_cache(config: &Config) -> CompilationCache {
    let store: Box<dyn CacheStore> = if config.cache_resolved.enabled {
        Box::new(FileStore::new(config.cache_resolved.dir.clone()))
    } else {
        Box::new(NullStore)
    };
    CompilationCache::open(store, &config.compile_resolved.output_dir)
}

/// Spacing rules for the `[[components]]` declared in the config.
pub(crate) fn spacing_rules(components: &[ComponentConfig]) -> SpacingRules {
    let components: Vec<ComponentInfo> = components
        .iter()
        .map(|c| ComponentInfo {
            name: c.name.clone(),
            prefers_inline: c.prefers_inline,
        })
        .collect();
    SpacingRules::new(&components)
}
