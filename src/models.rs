//! Data models for Satisfactory recipes, materials and unlock conditions
//!
//! A [`Catalog`] is an immutable snapshot of recipe records. It is loaded
//! and replaced wholesale; nothing mutates a catalog in place.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::CatalogError;
use crate::resources;

/// A material and its rate in items (or m³) per minute
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAmount {
    pub material: String,
    pub quantity: f64,
}

impl MaterialAmount {
    pub fn new(material: impl Into<String>, quantity: f64) -> Self {
        Self {
            material: material.into(),
            quantity,
        }
    }
}

/// The machine a recipe runs in and its power draw
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub name: String,
    pub power_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TierGate {
    pub level: u32,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResearchGate {
    pub tree: String,
    pub node: String,
}

/// Gating rule of a recipe that is not always available.
///
/// A recipe with both a tier and a research gate is unlocked by either.
/// `alternate` marks an optional recipe that additionally needs an
/// explicit opt-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnlockGate {
    pub tier: Option<TierGate>,
    pub research: Option<ResearchGate>,
    pub alternate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnlockCondition {
    /// Available from the start
    #[default]
    Always,
    Gated(UnlockGate),
}

impl UnlockCondition {
    pub fn tier(level: u32, section: impl Into<String>) -> Self {
        Self::Gated(UnlockGate {
            tier: Some(TierGate {
                level,
                section: section.into(),
            }),
            ..UnlockGate::default()
        })
    }

    pub fn research(tree: impl Into<String>, node: impl Into<String>) -> Self {
        Self::Gated(UnlockGate {
            research: Some(ResearchGate {
                tree: tree.into(),
                node: node.into(),
            }),
            ..UnlockGate::default()
        })
    }

    /// Mark this condition as an alternate recipe, keeping any gate it has
    pub fn into_alternate(self) -> Self {
        let mut gate = match self {
            Self::Always => UnlockGate::default(),
            Self::Gated(gate) => gate,
        };
        gate.alternate = true;
        Self::Gated(gate)
    }

    pub fn gate(&self) -> Option<&UnlockGate> {
        match self {
            Self::Always => None,
            Self::Gated(gate) => Some(gate),
        }
    }

    pub fn is_alternate(&self) -> bool {
        self.gate().is_some_and(|gate| gate.alternate)
    }
}

impl std::fmt::Display for UnlockCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gate = match self {
            Self::Always => return write!(f, "always"),
            Self::Gated(gate) => gate,
        };

        let mut parts = Vec::new();
        if let Some(tier) = &gate.tier {
            parts.push(format!("Tier {} - {}", tier.level, tier.section));
        }
        if let Some(research) = &gate.research {
            parts.push(format!("MAM {} - {}", research.tree, research.node));
        }
        let mut text = if parts.is_empty() {
            "unspecified".to_string()
        } else {
            parts.join(" OR ")
        };
        if gate.alternate {
            text.push_str(" (alternate)");
        }
        write!(f, "{}", text)
    }
}

/// A fixed conversion of ingredients into products at a fixed power cost
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub ingredients: Vec<MaterialAmount>,
    pub products: Vec<MaterialAmount>,
    pub machine: Machine,
    pub unlock: UnlockCondition,
}

impl Recipe {
    pub fn new(name: impl Into<String>, machine: impl Into<String>, power_mw: f64) -> Self {
        Self {
            name: name.into(),
            ingredients: Vec::new(),
            products: Vec::new(),
            machine: Machine {
                name: machine.into(),
                power_mw,
            },
            unlock: UnlockCondition::Always,
        }
    }

    pub fn with_ingredient(mut self, material: impl Into<String>, quantity: f64) -> Self {
        self.ingredients.push(MaterialAmount::new(material, quantity));
        self
    }

    pub fn with_product(mut self, material: impl Into<String>, quantity: f64) -> Self {
        self.products.push(MaterialAmount::new(material, quantity));
        self
    }

    pub fn with_unlock(mut self, unlock: UnlockCondition) -> Self {
        self.unlock = unlock;
        self
    }

    /// Total rate of `material` produced by one instance
    pub fn produced(&self, material: &str) -> f64 {
        sum_of(&self.products, material)
    }

    /// Total rate of `material` consumed by one instance
    pub fn consumed(&self, material: &str) -> f64 {
        sum_of(&self.ingredients, material)
    }

    /// Extraction recipes take nothing in
    pub fn is_extraction(&self) -> bool {
        self.ingredients.is_empty()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::malformed("<unnamed>", "empty recipe name"));
        }
        if self.products.is_empty() {
            return Err(CatalogError::malformed(&self.name, "recipe has no products"));
        }
        for amount in self.ingredients.iter().chain(&self.products) {
            if amount.material.trim().is_empty() {
                return Err(CatalogError::malformed(&self.name, "empty material name"));
            }
            if !amount.quantity.is_finite() || amount.quantity < 0.0 {
                return Err(CatalogError::malformed(
                    &self.name,
                    format!("invalid quantity {} for '{}'", amount.quantity, amount.material),
                ));
            }
        }
        if self.machine.name.trim().is_empty() {
            return Err(CatalogError::malformed(&self.name, "empty machine name"));
        }
        // Power generation is not modeled
        if !self.machine.power_mw.is_finite() || self.machine.power_mw < 0.0 {
            return Err(CatalogError::malformed(
                &self.name,
                format!("invalid power draw {} MW", self.machine.power_mw),
            ));
        }
        Ok(())
    }
}

fn sum_of(amounts: &[MaterialAmount], material: &str) -> f64 {
    amounts
        .iter()
        .filter(|a| a.material == material)
        .map(|a| a.quantity)
        .sum()
}

/// Immutable snapshot of every known recipe, in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    recipes: Vec<Recipe>,
}

impl Catalog {
    /// Build a catalog, rejecting invalid recipes and duplicate names
    pub fn from_recipes(recipes: Vec<Recipe>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for recipe in &recipes {
            recipe.validate()?;
            if !seen.insert(recipe.name.as_str()) {
                return Err(CatalogError::DuplicateRecipe(recipe.name.clone()));
            }
        }
        Ok(Self { recipes })
    }

    pub fn from_records(records: Vec<RecipeRecord>) -> Result<Self, CatalogError> {
        let recipes = records
            .into_iter()
            .map(Recipe::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_recipes(recipes)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<RecipeRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let records: Vec<RecipeRecord> = serde_json::from_reader(reader)?;
        Self::from_records(records)
    }

    /// Load a catalog snapshot file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path)?;
        let catalog = Self::from_reader(BufReader::new(file))?;
        debug!(event = "catalog_loaded", path = %path.display(), recipes = catalog.len());
        Ok(catalog)
    }

    pub fn to_records(&self) -> Vec<RecipeRecord> {
        self.recipes.iter().map(RecipeRecord::from).collect()
    }

    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(&self.to_records())?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// A new snapshot with `extra` appended after the existing recipes
    pub fn extended(&self, extra: Vec<Recipe>) -> Result<Self, CatalogError> {
        let mut recipes = self.recipes.clone();
        recipes.extend(extra);
        Self::from_recipes(recipes)
    }
}

// Snapshot record format

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRecord {
    #[serde(rename = "Material", default)]
    pub material: Option<String>,
    #[serde(rename = "Quantity", default)]
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    #[serde(rename = "Machine", default)]
    pub machine: Option<String>,
    #[serde(rename = "Pwr Cons", default)]
    pub power: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TierRecord {
    #[serde(rename = "Level")]
    level: u32,
    #[serde(rename = "Section")]
    section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResearchRecord {
    #[serde(rename = "Tree")]
    tree: String,
    #[serde(rename = "Node")]
    node: String,
}

/// One recipe as it appears in a catalog snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRecord {
    #[serde(rename = "Recipe", default)]
    pub name: Option<String>,
    #[serde(rename = "Ingredients", default)]
    pub ingredients: Option<Vec<AmountRecord>>,
    #[serde(rename = "Produced in", default)]
    pub produced_in: Option<Vec<MachineRecord>>,
    #[serde(rename = "Products", default)]
    pub products: Option<Vec<AmountRecord>>,
    #[serde(rename = "Unlocked by", default)]
    pub unlocked_by: Value,
}

impl TryFrom<RecipeRecord> for Recipe {
    type Error = CatalogError;

    fn try_from(record: RecipeRecord) -> Result<Self, Self::Error> {
        let name = record
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| CatalogError::malformed("<unnamed>", "missing 'Recipe' name"))?;

        let ingredients = parse_amounts(&name, "Ingredients", record.ingredients.unwrap_or_default())?;
        let products = match record.products {
            Some(products) => parse_amounts(&name, "Products", products)?,
            None => return Err(CatalogError::malformed(&name, "missing 'Products'")),
        };
        let machine = parse_machine(&name, record.produced_in.unwrap_or_default())?;
        let unlock = parse_unlock(&name, &record.unlocked_by)?;

        let recipe = Recipe {
            name,
            ingredients,
            products,
            machine,
            unlock,
        };
        recipe.validate()?;
        Ok(recipe)
    }
}

impl From<&Recipe> for RecipeRecord {
    fn from(recipe: &Recipe) -> Self {
        let amounts = |list: &[MaterialAmount]| {
            list.iter()
                .map(|a| AmountRecord {
                    material: Some(a.material.clone()),
                    quantity: Some(a.quantity),
                })
                .collect::<Vec<_>>()
        };
        Self {
            name: Some(recipe.name.clone()),
            ingredients: Some(amounts(&recipe.ingredients)),
            produced_in: Some(vec![MachineRecord {
                machine: Some(recipe.machine.name.clone()),
                power: Some(recipe.machine.power_mw),
            }]),
            products: Some(amounts(&recipe.products)),
            unlocked_by: unlock_value(&recipe.unlock),
        }
    }
}

fn parse_amounts(
    recipe: &str,
    field: &str,
    records: Vec<AmountRecord>,
) -> Result<Vec<MaterialAmount>, CatalogError> {
    records
        .into_iter()
        .map(|record| match (record.material, record.quantity) {
            (Some(material), Some(quantity)) => Ok(MaterialAmount { material, quantity }),
            (None, _) => Err(CatalogError::malformed(recipe, format!("'{field}' entry without 'Material'"))),
            (Some(material), None) => Err(CatalogError::malformed(
                recipe,
                format!("'{field}' entry '{material}' without 'Quantity'"),
            )),
        })
        .collect()
}

fn parse_machine(recipe: &str, records: Vec<MachineRecord>) -> Result<Machine, CatalogError> {
    if records.len() > 1 {
        debug!(event = "extra_machines_ignored", recipe, count = records.len());
    }
    let record = records
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::malformed(recipe, "missing 'Produced in'"))?;
    let name = record
        .machine
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| CatalogError::malformed(recipe, "'Produced in' entry without 'Machine'"))?;
    let power_mw = match record.power {
        Some(power) => power,
        None => resources::machine_power(&name).ok_or_else(|| {
            CatalogError::malformed(recipe, format!("no power figure for machine '{name}'"))
        })?,
    };
    Ok(Machine { name, power_mw })
}

fn parse_unlock(recipe: &str, value: &Value) -> Result<UnlockCondition, CatalogError> {
    let map = match value {
        Value::Null => return Ok(UnlockCondition::Always),
        Value::String(text) if text.trim().is_empty() => return Ok(UnlockCondition::Always),
        Value::Object(map) if map.is_empty() => return Ok(UnlockCondition::Always),
        Value::Object(map) => map,
        other => {
            return Err(CatalogError::malformed(
                recipe,
                format!("unsupported 'Unlocked by' value: {other}"),
            ));
        }
    };

    let tier = single_entry::<TierRecord>(recipe, map.get("Tier"), "Tier")?.map(|t| TierGate {
        level: t.level,
        section: t.section,
    });
    let research = single_entry::<ResearchRecord>(recipe, map.get("MAM Research"), "MAM Research")?
        .map(|r| ResearchGate {
            tree: r.tree,
            node: r.node,
        });
    let alternate = match map.get("Alternate") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(CatalogError::malformed(
                recipe,
                format!("'Alternate' must be a boolean, got {other}"),
            ));
        }
    };

    Ok(UnlockCondition::Gated(UnlockGate {
        tier,
        research,
        alternate,
    }))
}

/// Unlock lists hold at most one entry; more would not survive a reload
fn single_entry<T: DeserializeOwned>(
    recipe: &str,
    value: Option<&Value>,
    field: &str,
) -> Result<Option<T>, CatalogError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let mut entries: Vec<T> = serde_json::from_value(value.clone())
                .map_err(|e| CatalogError::malformed(recipe, format!("invalid '{field}': {e}")))?;
            if entries.len() > 1 {
                return Err(CatalogError::malformed(
                    recipe,
                    format!("'{field}' lists {} entries, expected at most one", entries.len()),
                ));
            }
            Ok(entries.pop())
        }
    }
}

fn unlock_value(unlock: &UnlockCondition) -> Value {
    let gate = match unlock {
        UnlockCondition::Always => return Value::String(String::new()),
        UnlockCondition::Gated(gate) => gate,
    };

    let mut map = Map::new();
    map.insert(
        "Tier".to_string(),
        gate.tier
            .as_ref()
            .map_or(Value::Null, |t| json!([{ "Level": t.level, "Section": t.section }])),
    );
    map.insert(
        "MAM Research".to_string(),
        gate.research
            .as_ref()
            .map_or(Value::Null, |r| json!([{ "Tree": r.tree, "Node": r.node }])),
    );
    map.insert("Alternate".to_string(), Value::Bool(gate.alternate));
    Value::Object(map)
}
