mod compiler;
mod database;

pub use compiler::{
    compile_content_dir, compile_content_str, ContentCompileError, ContentErrorCode,
    ContentLoadError, SourceLocation,
};
pub use database::{
    CatalogError, ContentDatabase, EffectOp, EffectStat, EnemyArchetype, GridCoord, LootCatalog,
    LootDef, LootEffect, LootTargetKind, PathDef, Rarity,
};
