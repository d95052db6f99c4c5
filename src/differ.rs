//! Structural comparison of two catalog snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ordered_float::OrderedFloat;

use crate::error::DiffError;
use crate::models::{Catalog, MaterialAmount, Recipe, UnlockCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeField {
    Ingredients,
    Products,
    ProducedIn,
    UnlockedBy,
}

impl std::fmt::Display for RecipeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ingredients => "Ingredients",
            Self::Products => "Products",
            Self::ProducedIn => "Produced in",
            Self::UnlockedBy => "Unlocked by",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: RecipeField,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeChange {
    pub recipe: String,
    pub fields: Vec<FieldChange>,
}

/// Differences between an old and a new catalog, names sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// There was no old catalog; everything in `added` is new
    pub old_missing: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<RecipeChange>,
}

impl DiffReport {
    pub fn has_differences(&self) -> bool {
        self.old_missing || !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }
}

type AmountSet = BTreeSet<(String, OrderedFloat<f64>)>;

fn amount_set(amounts: &[MaterialAmount]) -> AmountSet {
    amounts
        .iter()
        .map(|a| (a.material.clone(), OrderedFloat(a.quantity)))
        .collect()
}

fn machine_set(recipe: &Recipe) -> AmountSet {
    BTreeSet::from([(recipe.machine.name.clone(), OrderedFloat(recipe.machine.power_mw))])
}

fn render_set(set: &AmountSet) -> String {
    let items: Vec<String> = set
        .iter()
        .map(|(name, value)| format!("({}, {})", name, value))
        .collect();
    format!("[{}]", items.join(", "))
}

fn compare_sets(field: RecipeField, old: AmountSet, new: AmountSet) -> Option<FieldChange> {
    (old != new).then(|| FieldChange {
        field,
        old: render_set(&old),
        new: render_set(&new),
    })
}

fn compare_unlock(old: &UnlockCondition, new: &UnlockCondition) -> Option<FieldChange> {
    (old != new).then(|| FieldChange {
        field: RecipeField::UnlockedBy,
        old: old.to_string(),
        new: new.to_string(),
    })
}

/// Field-by-field changes of a recipe present in both catalogs
pub fn compare_recipes(old: &Recipe, new: &Recipe) -> Vec<FieldChange> {
    [
        compare_sets(
            RecipeField::Ingredients,
            amount_set(&old.ingredients),
            amount_set(&new.ingredients),
        ),
        compare_sets(
            RecipeField::Products,
            amount_set(&old.products),
            amount_set(&new.products),
        ),
        compare_sets(RecipeField::ProducedIn, machine_set(old), machine_set(new)),
        compare_unlock(&old.unlock, &new.unlock),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Compare two catalogs. A missing old catalog means everything is new.
pub fn diff(old: Option<&Catalog>, new: &Catalog) -> DiffReport {
    let new_index: BTreeMap<&str, &Recipe> = new.recipes().iter().map(|r| (r.name.as_str(), r)).collect();

    let Some(old) = old else {
        return DiffReport {
            old_missing: true,
            added: new_index.keys().map(|name| name.to_string()).collect(),
            ..DiffReport::default()
        };
    };
    let old_index: BTreeMap<&str, &Recipe> = old.recipes().iter().map(|r| (r.name.as_str(), r)).collect();

    let mut report = DiffReport::default();
    for (name, new_recipe) in &new_index {
        match old_index.get(name) {
            None => report.added.push(name.to_string()),
            Some(old_recipe) => {
                let fields = compare_recipes(old_recipe, new_recipe);
                if !fields.is_empty() {
                    report.changed.push(RecipeChange {
                        recipe: name.to_string(),
                        fields,
                    });
                }
            }
        }
    }
    report.removed = old_index
        .keys()
        .filter(|name| !new_index.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    report
}

/// Compare two snapshot files. Only the new one has to exist.
pub fn diff_files(old_path: &Path, new_path: &Path) -> Result<DiffReport, DiffError> {
    if !new_path.is_file() {
        return Err(DiffError::MissingNewCatalog(new_path.to_path_buf()));
    }
    let new = Catalog::load(new_path)?;
    let old = if old_path.is_file() {
        Some(Catalog::load(old_path)?)
    } else {
        None
    };
    Ok(diff(old.as_ref(), &new))
}

impl std::fmt::Display for DiffReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.old_missing {
            return write!(
                f,
                "Old catalog not found. Assuming all {} recipes are new.",
                self.added.len()
            );
        }

        let mut sections = Vec::new();
        if !self.added.is_empty() {
            sections.push(format!("Recipes added:\n{}", self.added.join("\n")));
        }
        if !self.removed.is_empty() {
            sections.push(format!("Recipes removed:\n{}", self.removed.join("\n")));
        }
        for change in &self.changed {
            let mut section = format!("Recipe changed: {}", change.recipe);
            for field in &change.fields {
                section.push_str(&format!(
                    "\n  Field '{}' changed:\n    Old: {}\n    New: {}",
                    field.field, field.old, field.new
                ));
            }
            sections.push(section);
        }
        if sections.is_empty() {
            sections.push("No differences found.".to_string());
        }
        write!(f, "{}", sections.join("\n\n"))
    }
}
