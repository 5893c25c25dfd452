use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::info;

use crate::app::GRID_SIZE;

use super::database::{
    ContentDatabase, EffectOp, EffectStat, EnemyArchetype, GridCoord, LootCatalog, LootDef,
    LootEffect, LootTargetKind, PathDef, Rarity,
};

const DEFAULT_ENEMY_MAX_HEALTH: f32 = 10.0;
const DEFAULT_ENEMY_MAX_COINS: u32 = 5;
const DEFAULT_ENEMY_SPEED: f32 = 0.03;
const DEFAULT_ENEMY_LOOT_CHANCE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
    UnknownLootReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Error)]
pub enum ContentLoadError {
    #[error("content directory does not exist: {path}")]
    MissingContentDir { path: PathBuf },
    #[error("failed to read content at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Compile(#[from] ContentCompileError),
}

#[derive(Debug, Clone)]
struct PendingEnemyDef {
    def: EnemyArchetype,
    file_path: PathBuf,
    location: SourceLocation,
}

#[derive(Debug, Default)]
struct PendingContent {
    loot: BTreeMap<String, LootDef>,
    enemies: BTreeMap<String, PendingEnemyDef>,
    paths: BTreeMap<String, PathDef>,
}

/// Compiles every `*.xml` file under `dir`, in sorted relative-path order,
/// into one database. Any authoring error aborts the whole load.
pub fn compile_content_dir(dir: &Path) -> Result<ContentDatabase, ContentLoadError> {
    if !dir.is_dir() {
        return Err(ContentLoadError::MissingContentDir {
            path: dir.to_path_buf(),
        });
    }

    let xml_files = collect_xml_files_sorted(dir)?;
    let mut pending = PendingContent::default();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file).map_err(|source| ContentLoadError::Read {
            path: xml_file.clone(),
            source,
        })?;
        parse_defs_document(xml_file, &raw, &mut pending)?;
    }

    let database = finish(pending)?;
    info!(
        content_dir = %dir.display(),
        xml_file_count = xml_files.len(),
        loot_defs = database.loot_catalog().len(),
        enemy_defs = database.enemies().len(),
        "content_compiled"
    );
    Ok(database)
}

/// Compiles a single in-memory document. `file_path` only labels errors.
pub fn compile_content_str(
    file_path: &Path,
    raw: &str,
) -> Result<ContentDatabase, ContentCompileError> {
    let mut pending = PendingContent::default();
    parse_defs_document(file_path, raw, &mut pending)?;
    finish(pending)
}

fn finish(pending: PendingContent) -> Result<ContentDatabase, ContentCompileError> {
    let mut enemies = Vec::with_capacity(pending.enemies.len());
    for (_, enemy) in pending.enemies {
        if let Some(loot_id) = enemy.def.carries_loot.as_deref() {
            if !pending.loot.contains_key(loot_id) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::UnknownLootReference,
                    message: format!(
                        "EnemyDef '{}' carries loot '{}' which has no LootDef",
                        enemy.def.def_name, loot_id
                    ),
                    file_path: enemy.file_path,
                    location: Some(enemy.location),
                });
            }
        }
        enemies.push(enemy.def);
    }

    Ok(ContentDatabase::new(
        LootCatalog::from_defs(pending.loot.into_values()),
        enemies,
        pending.paths.into_values().collect(),
    ))
}

struct DocContext<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl DocContext<'_, '_> {
    fn location_of(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location_of(node)),
        }
    }
}

fn parse_defs_document(
    file_path: &Path,
    raw: &str,
    pending: &mut PendingContent,
) -> Result<(), ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = DocContext {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "LootDef" => {
                let def = parse_loot_def(&ctx, child)?;
                if pending.loot.contains_key(&def.id) {
                    return Err(duplicate_def(&ctx, "LootDef", &def.id, child));
                }
                pending.loot.insert(def.id.clone(), def);
            }
            "EnemyDef" => {
                let def = parse_enemy_def(&ctx, child)?;
                if pending.enemies.contains_key(&def.def_name) {
                    return Err(duplicate_def(&ctx, "EnemyDef", &def.def_name, child));
                }
                pending.enemies.insert(
                    def.def_name.clone(),
                    PendingEnemyDef {
                        def,
                        file_path: file_path.to_path_buf(),
                        location: ctx.location_of(child),
                    },
                );
            }
            "PathDef" => {
                let def = parse_path_def(&ctx, child)?;
                if pending.paths.contains_key(&def.def_name) {
                    return Err(duplicate_def(&ctx, "PathDef", &def.def_name, child));
                }
                pending.paths.insert(def.def_name.clone(), def);
            }
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected <LootDef>, <EnemyDef> or <PathDef>"
                    ),
                    child,
                ))
            }
        }
    }

    Ok(())
}

fn duplicate_def(
    ctx: &DocContext<'_, '_>,
    def_type: &str,
    def_name: &str,
    node: Node<'_, '_>,
) -> ContentCompileError {
    ctx.error_at(
        ContentErrorCode::DuplicateDef,
        format!("duplicate {def_type} '{def_name}'; each defName may be defined once"),
        node,
    )
}

/// Field elements of one def, keyed by tag name.
struct Fields<'a, 'input> {
    def_type: &'static str,
    owner: Node<'a, 'input>,
    by_name: HashMap<String, Node<'a, 'input>>,
}

impl<'a, 'input> Fields<'a, 'input> {
    fn collect(
        ctx: &DocContext<'_, '_>,
        def_type: &'static str,
        owner: Node<'a, 'input>,
        allowed: &[&str],
    ) -> Result<Self, ContentCompileError> {
        let mut by_name = HashMap::new();
        for field in owner.children().filter(|child| child.is_element()) {
            let field_name = field.tag_name().name().to_string();
            if !allowed.contains(&field_name.as_str()) {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <{def_type}>"),
                    field,
                ));
            }
            if by_name.insert(field_name.clone(), field).is_some() {
                return Err(ctx.error_at(
                    ContentErrorCode::DuplicateField,
                    format!("duplicate field <{field_name}> in <{def_type}>"),
                    field,
                ));
            }
        }
        Ok(Self {
            def_type,
            owner,
            by_name,
        })
    }

    fn optional_text(
        &self,
        ctx: &DocContext<'_, '_>,
        name: &str,
    ) -> Result<Option<(String, Node<'a, 'input>)>, ContentCompileError> {
        let Some(node) = self.by_name.get(name).copied() else {
            return Ok(None);
        };
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(ctx.error_at(
                ContentErrorCode::MissingField,
                format!("field <{name}> must not be empty"),
                node,
            ));
        }
        Ok(Some((value, node)))
    }

    fn required_text(
        &self,
        ctx: &DocContext<'_, '_>,
        name: &str,
    ) -> Result<(String, Node<'a, 'input>), ContentCompileError> {
        self.optional_text(ctx, name)?.ok_or_else(|| {
            ctx.error_at(
                ContentErrorCode::MissingField,
                format!("missing required field <{name}> in <{}>", self.def_type),
                self.owner,
            )
        })
    }

    fn optional_number<T: FromStr>(
        &self,
        ctx: &DocContext<'_, '_>,
        name: &str,
    ) -> Result<Option<(T, Node<'a, 'input>)>, ContentCompileError> {
        let Some((value, node)) = self.optional_text(ctx, name)? else {
            return Ok(None);
        };
        let parsed = value.parse::<T>().map_err(|_| {
            ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("{name} '{value}' is not a valid number"),
                node,
            )
        })?;
        Ok(Some((parsed, node)))
    }
}

fn parse_loot_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<LootDef, ContentCompileError> {
    let fields = Fields::collect(
        ctx,
        "LootDef",
        node,
        &[
            "defName",
            "label",
            "description",
            "target",
            "effect",
            "value",
            "stackCap",
            "rarity",
            "persistent",
        ],
    )?;

    let (id, _) = fields.required_text(ctx, "defName")?;
    let (label, _) = fields.required_text(ctx, "label")?;
    let description = fields.optional_text(ctx, "description")?.map(|(text, _)| text);

    let (target_text, target_node) = fields.required_text(ctx, "target")?;
    let target = match target_text.as_str() {
        "Player" => LootTargetKind::Player,
        "TowerIndividual" => LootTargetKind::TowerIndividual,
        _ => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!(
                    "invalid target '{target_text}'; allowed values: Player, TowerIndividual"
                ),
                target_node,
            ))
        }
    };

    let (effect_text, effect_node) = fields.required_text(ctx, "effect")?;
    let (op, stat) = parse_effect_token(&effect_text).ok_or_else(|| {
        ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!(
                "invalid effect '{effect_text}'; expected mul_<stat> or add_<stat> with stat \
                 one of damage, fireRate, playerDamage, goldPercent"
            ),
            effect_node,
        )
    })?;
    if stat.target_kind() != target {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!(
                "effect '{effect_text}' cannot apply to target {}",
                target.as_token()
            ),
            effect_node,
        ));
    }

    let Some((value, value_node)) = fields.optional_number::<f32>(ctx, "value")? else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <value> in <LootDef>".to_string(),
            node,
        ));
    };
    let value_ok = match op {
        EffectOp::Multiply => value.is_finite() && value > 0.0,
        EffectOp::Add => value.is_finite(),
    };
    if !value_ok {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            "value must be finite, and > 0 for mul_ effects".to_string(),
            value_node,
        ));
    }

    let stack_cap = match fields.optional_number::<u32>(ctx, "stackCap")? {
        Some((0, cap_node)) => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "stackCap must be >= 1; omit it for an uncapped effect".to_string(),
                cap_node,
            ))
        }
        Some((cap, _)) => Some(cap),
        None => None,
    };

    let (rarity_text, rarity_node) = fields.required_text(ctx, "rarity")?;
    let rarity = Rarity::from_token(&rarity_text).ok_or_else(|| {
        ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!("invalid rarity '{rarity_text}'; allowed values: Common, Uncommon, Rare, Epic"),
            rarity_node,
        )
    })?;

    let persistent = match fields.optional_text(ctx, "persistent")? {
        None => true,
        Some((text, persistent_node)) => match text.as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ctx.error_at(
                    ContentErrorCode::InvalidValue,
                    format!("persistent '{text}' must be true or false"),
                    persistent_node,
                ))
            }
        },
    };

    Ok(LootDef {
        id,
        label,
        description,
        target,
        effect: LootEffect { op, stat, value },
        stack_cap,
        rarity,
        persistent,
    })
}

fn parse_effect_token(token: &str) -> Option<(EffectOp, EffectStat)> {
    let (prefix, stat) = token.split_once('_')?;
    let op = match prefix {
        "mul" => EffectOp::Multiply,
        "add" => EffectOp::Add,
        _ => return None,
    };
    Some((op, EffectStat::from_token(stat)?))
}

fn parse_enemy_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<EnemyArchetype, ContentCompileError> {
    let fields = Fields::collect(
        ctx,
        "EnemyDef",
        node,
        &[
            "defName",
            "maxHealth",
            "maxCoins",
            "speed",
            "carriesLoot",
            "lootChance",
        ],
    )?;

    let (def_name, _) = fields.required_text(ctx, "defName")?;

    let max_health = match fields.optional_number::<f32>(ctx, "maxHealth")? {
        Some((value, field)) if !value.is_finite() || value <= 0.0 => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "maxHealth must be finite and > 0".to_string(),
                field,
            ))
        }
        Some((value, _)) => value,
        None => DEFAULT_ENEMY_MAX_HEALTH,
    };
    let max_coins = fields
        .optional_number::<u32>(ctx, "maxCoins")?
        .map_or(DEFAULT_ENEMY_MAX_COINS, |(value, _)| value);
    let speed = match fields.optional_number::<f32>(ctx, "speed")? {
        Some((value, field)) if !value.is_finite() || value <= 0.0 => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "speed must be finite and > 0".to_string(),
                field,
            ))
        }
        Some((value, _)) => value,
        None => DEFAULT_ENEMY_SPEED,
    };
    let carries_loot = fields.optional_text(ctx, "carriesLoot")?.map(|(id, _)| id);
    let loot_chance = match fields.optional_number::<f32>(ctx, "lootChance")? {
        Some((value, field)) if !(0.0..=1.0).contains(&value) => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "lootChance must be within [0, 1]".to_string(),
                field,
            ))
        }
        Some((value, _)) => value,
        None => DEFAULT_ENEMY_LOOT_CHANCE,
    };

    Ok(EnemyArchetype {
        def_name,
        max_health,
        max_coins,
        speed,
        carries_loot,
        loot_chance,
    })
}

fn parse_path_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<PathDef, ContentCompileError> {
    let fields = Fields::collect(ctx, "PathDef", node, &["defName", "points"])?;
    let (def_name, _) = fields.required_text(ctx, "defName")?;
    let (points_text, points_node) = fields.required_text(ctx, "points")?;

    let mut points = Vec::new();
    for raw_point in points_text.split(';').map(str::trim) {
        if raw_point.is_empty() {
            continue;
        }
        let point = parse_grid_point(raw_point).ok_or_else(|| {
            ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!(
                    "point '{raw_point}' must be 'x,y' with both coordinates in [0, {GRID_SIZE})"
                ),
                points_node,
            )
        })?;
        points.push(point);
    }
    if points.is_empty() {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            "a path needs at least one point".to_string(),
            points_node,
        ));
    }

    Ok(PathDef { def_name, points })
}

fn parse_grid_point(raw: &str) -> Option<GridCoord> {
    let (x, y) = raw.split_once(',')?;
    let x = x.trim().parse::<u32>().ok()?;
    let y = y.trim().parse::<u32>().ok()?;
    (x < GRID_SIZE && y < GRID_SIZE).then_some(GridCoord { x, y })
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ContentLoadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ContentLoadError> {
    let entries = fs::read_dir(current).map_err(|source| ContentLoadError::Read {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ContentLoadError::Read {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
