//! Catalog import: read a snapshot file and complete it with extraction
//! recipes for raw materials

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::classifier::{self, MaterialInfo};
use crate::models::{Catalog, Recipe};
use crate::resources::{self, EXTRACTION_MACHINE, HAND_CRANK_MACHINE, HAND_CRANK_POWER_MW};

/// Power draw (MW) of extracting one unit per minute, per raw material
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPower(BTreeMap<String, f64>);

impl Default for ExtractionPower {
    fn default() -> Self {
        Self(BTreeMap::from([(
            "Water".to_string(),
            resources::WATER_EXTRACTION_POWER_MW,
        )]))
    }
}

impl ExtractionPower {
    /// Load a `{ "Material": MW, ... }` table on top of the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let table: BTreeMap<String, f64> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid extraction power table {}", path.display()))?;
        let mut power = Self::default();
        power.0.extend(table);
        Ok(power)
    }

    pub fn get(&self, material: &str) -> Option<f64> {
        self.0.get(material).copied()
    }
}

/// Name of the synthesized recipe extracting `material`
pub fn extraction_recipe_name(material: &str) -> String {
    format!("{} Extraction", material)
}

/// Extraction recipes for every base material nothing produces yet
pub fn extraction_recipes(
    materials: &BTreeMap<String, MaterialInfo>,
    power: &ExtractionPower,
) -> Vec<Recipe> {
    let mut recipes = Vec::new();
    for info in materials.values() {
        if !info.is_base || !info.producers.is_empty() {
            continue;
        }
        let recipe = match power.get(&info.name) {
            Some(mw) => Recipe::new(extraction_recipe_name(&info.name), EXTRACTION_MACHINE, mw),
            None => {
                warn!(event = "extraction_power_unknown", material = %info.name);
                Recipe::new(
                    extraction_recipe_name(&info.name),
                    HAND_CRANK_MACHINE,
                    HAND_CRANK_POWER_MW,
                )
            }
        };
        recipes.push(recipe.with_product(info.name.clone(), 1.0));
    }
    recipes
}

/// A new catalog with extraction recipes appended for raw materials
pub fn with_extraction_recipes(catalog: &Catalog, power: &ExtractionPower) -> Result<Catalog> {
    let materials = classifier::classify(catalog);
    let extra = extraction_recipes(&materials, power);
    catalog
        .extended(extra)
        .context("Extraction recipes clash with existing recipe names")
}

/// Load a snapshot file, optionally completing it with extraction recipes
pub fn import_catalog(path: &Path, extraction: Option<&ExtractionPower>) -> Result<(Catalog, ImportStats)> {
    let loaded = Catalog::load(path).with_context(|| format!("Failed to load catalog {}", path.display()))?;
    let source_recipes = loaded.len();

    let catalog = match extraction {
        Some(power) => with_extraction_recipes(&loaded, power)?,
        None => loaded,
    };

    let materials = classifier::classify(&catalog);
    let stats = ImportStats {
        recipes: catalog.len(),
        extraction_added: catalog.len() - source_recipes,
        materials: materials.len(),
        base: materials.values().filter(|m| m.is_base).count(),
        end: materials.values().filter(|m| m.is_end).count(),
    };
    info!(
        event = "catalog_imported",
        path = %path.display(),
        recipes = stats.recipes,
        extraction_added = stats.extraction_added,
    );
    Ok((catalog, stats))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub recipes: usize,
    pub extraction_added: usize,
    pub materials: usize,
    pub base: usize,
    pub end: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} recipes ({} extraction recipes added). Materials: {} ({} base, {} end)",
            self.recipes, self.extraction_added, self.materials, self.base, self.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"[
      {
        "Recipe": "Iron Ingot",
        "Ingredients": [{"Material": "Iron Ore", "Quantity": 30.0}],
        "Produced in": [{"Machine": "Smelter", "Pwr Cons": 4.0}],
        "Products": [{"Material": "Iron Ingot", "Quantity": 30.0}],
        "Unlocked by": ""
      },
      {
        "Recipe": "Concrete",
        "Ingredients": [{"Material": "Limestone", "Quantity": 45.0}, {"Material": "Water", "Quantity": 10.0}],
        "Produced in": [{"Machine": "Constructor", "Pwr Cons": 4.0}],
        "Products": [{"Material": "Concrete", "Quantity": 15.0}],
        "Unlocked by": ""
      }
    ]"#;

    #[test]
    fn adds_one_extraction_recipe_per_raw_material() {
        let catalog = Catalog::from_json_str(SNAPSHOT).unwrap();
        let power = ExtractionPower(BTreeMap::from([
            ("Iron Ore".to_string(), 0.5),
            ("Water".to_string(), 0.2),
        ]));
        let completed = with_extraction_recipes(&catalog, &power).unwrap();
        assert_eq!(completed.len(), 5);

        let ore = completed.get("Iron Ore Extraction").unwrap();
        assert_eq!(ore.machine.name, EXTRACTION_MACHINE);
        assert_eq!(ore.machine.power_mw, 0.5);
        assert!(ore.is_extraction());
        assert_eq!(ore.produced("Iron Ore"), 1.0);

        let limestone = completed.get("Limestone Extraction").unwrap();
        assert_eq!(limestone.machine.name, HAND_CRANK_MACHINE);
        assert_eq!(limestone.machine.power_mw, HAND_CRANK_POWER_MW);

        // Running it again finds nothing left to add
        assert_eq!(with_extraction_recipes(&completed, &power).unwrap(), completed);
    }

    #[test]
    fn imports_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("recipes.json");
        let power_path = dir.path().join("power.json");
        fs::write(&catalog_path, SNAPSHOT).unwrap();
        fs::write(&power_path, r#"{"Iron Ore": 0.5, "Limestone": 0.5}"#).unwrap();

        let (plain, stats) = import_catalog(&catalog_path, None).unwrap();
        assert_eq!(plain.len(), 2);
        assert_eq!(stats.extraction_added, 0);
        assert_eq!(stats.materials, 5);
        assert_eq!(stats.base, 3);
        assert_eq!(stats.end, 2);

        let power = ExtractionPower::load(&power_path).unwrap();
        assert_eq!(power.get("Water"), Some(resources::WATER_EXTRACTION_POWER_MW));
        let (completed, stats) = import_catalog(&catalog_path, Some(&power)).unwrap();
        assert_eq!(completed.len(), 5);
        assert_eq!(stats.extraction_added, 3);
        assert_eq!(completed.get("Water Extraction").unwrap().machine.name, EXTRACTION_MACHINE);
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"[{"Recipe": "A"}]"#).unwrap();
        assert!(import_catalog(&path, None).is_err());
    }
}
