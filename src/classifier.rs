//! Material classification: base/end flags, extraction caps and the
//! unlock conditions each material inherits from its producers

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Catalog, UnlockCondition};
use crate::resources;

/// Derived metadata for one material of a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInfo {
    pub name: String,
    /// Extractable, or never produced by any recipe
    pub is_base: bool,
    /// Never consumed by any recipe
    pub is_end: bool,
    /// Theoretical maximum extraction rate for raw resources
    pub extraction_cap: Option<f64>,
    /// Recipes listing this material as a product, in catalog order
    pub producers: Vec<String>,
    /// Recipes listing this material as an ingredient, in catalog order
    pub consumers: Vec<String>,
    /// Union of the unlock conditions of every producer
    pub unlocks: BTreeSet<UnlockCondition>,
    /// Names of alternate recipes that produce this material
    pub alternate_producers: BTreeSet<String>,
}

impl MaterialInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_base: false,
            is_end: false,
            extraction_cap: resources::extraction_cap(name),
            producers: Vec::new(),
            consumers: Vec::new(),
            unlocks: BTreeSet::new(),
            alternate_producers: BTreeSet::new(),
        }
    }

    /// True when some producer needs no unlock, or nothing produces it at all
    pub fn is_always_available(&self) -> bool {
        self.producers.is_empty() || self.unlocks.contains(&UnlockCondition::Always)
    }

    pub fn is_extractable(&self) -> bool {
        self.extraction_cap.is_some()
    }
}

/// Classify every material of `catalog`, keyed and sorted by name
pub fn classify(catalog: &Catalog) -> BTreeMap<String, MaterialInfo> {
    let mut materials: BTreeMap<String, MaterialInfo> = BTreeMap::new();

    for recipe in catalog.recipes() {
        for product in &recipe.products {
            let info = materials
                .entry(product.material.clone())
                .or_insert_with(|| MaterialInfo::new(&product.material));
            if !info.producers.contains(&recipe.name) {
                info.producers.push(recipe.name.clone());
            }
            info.unlocks.insert(recipe.unlock.clone());
            if recipe.unlock.is_alternate() {
                info.alternate_producers.insert(recipe.name.clone());
            }
        }
        for ingredient in &recipe.ingredients {
            let info = materials
                .entry(ingredient.material.clone())
                .or_insert_with(|| MaterialInfo::new(&ingredient.material));
            if !info.consumers.contains(&recipe.name) {
                info.consumers.push(recipe.name.clone());
            }
        }
    }

    for info in materials.values_mut() {
        info.is_base = info.producers.is_empty() || info.is_extractable();
        info.is_end = info.consumers.is_empty();
    }

    materials
}

/// Names of the base materials of a classification
pub fn base_materials(materials: &BTreeMap<String, MaterialInfo>) -> BTreeSet<String> {
    materials
        .values()
        .filter(|info| info.is_base)
        .map(|info| info.name.clone())
        .collect()
}
