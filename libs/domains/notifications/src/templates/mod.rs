//! Template storage, seeding and rendering.

pub mod assets;
mod cache;
mod entity;
pub mod helpers;
mod postgres;
mod renderer;
mod seeder;
mod store;

pub use assets::{AssetBundle, AssetFile, AssetSource, BundledAssets, DirectoryAssets, MemoryAssets};
pub use cache::{CompiledTemplate, EvictionPolicy, TemplateCache};
pub use postgres::PgTemplateStore;
pub use renderer::TemplateRenderer;
pub use seeder::{TemplateSeeder, resolve_asset};
pub use store::{InMemoryTemplateStore, TemplateStore};
