//! Unlock filtering: reduce a catalog to the recipes a player can use

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{Catalog, Recipe, UnlockCondition};

/// What the player has unlocked so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSettings {
    /// Highest tier reached, if any
    pub tier: Option<u32>,
    /// Completed sections of the selected tier
    #[serde(default)]
    pub sections: BTreeSet<String>,
    /// Research tree -> completed nodes
    #[serde(default)]
    pub research: BTreeMap<String, BTreeSet<String>>,
    /// Alternate recipes the player opted into
    #[serde(default)]
    pub alternates: BTreeSet<String>,
}

impl SelectionSettings {
    /// Any research tree recorded, even one with no completed nodes
    pub fn has_research(&self) -> bool {
        !self.research.is_empty()
    }

    pub fn is_research_done(&self, tree: &str, node: &str) -> bool {
        self.research.get(tree).is_some_and(|nodes| nodes.contains(node))
    }
}

/// The player's unlock selection.
///
/// `Unconfigured` means the player never set anything up, which is not the
/// same as a configured selection that happens to be empty: only the latter
/// can opt into alternates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnlockSelection {
    #[default]
    Unconfigured,
    Configured(SelectionSettings),
}

/// Whether `recipe` is usable under `selection`
pub fn is_unlocked(recipe: &Recipe, selection: &UnlockSelection) -> bool {
    let gate = match &recipe.unlock {
        UnlockCondition::Always => return true,
        UnlockCondition::Gated(gate) => gate,
    };

    let settings = match selection {
        UnlockSelection::Unconfigured => return !gate.alternate,
        UnlockSelection::Configured(settings) => settings,
    };

    // Alternates need an explicit opt-in on top of their gate
    if gate.alternate && !settings.alternates.contains(&recipe.name) {
        return false;
    }

    // No tier and no research chosen: nothing is restricted yet
    if settings.tier.is_none() && !settings.has_research() {
        return true;
    }

    if let (Some(selected), Some(tier)) = (settings.tier, &gate.tier) {
        if tier.level < selected || (tier.level == selected && settings.sections.contains(&tier.section)) {
            return true;
        }
    }

    if let Some(research) = &gate.research {
        if settings.is_research_done(&research.tree, &research.node) {
            return true;
        }
    }

    false
}

/// Recipes of `catalog` usable under `selection`, in catalog order
pub fn filter<'a>(catalog: &'a Catalog, selection: &UnlockSelection) -> Vec<&'a Recipe> {
    catalog
        .recipes()
        .iter()
        .filter(|recipe| is_unlocked(recipe, selection))
        .collect()
}

/// Every material that appears in at least one of `recipes`
pub fn available_materials(recipes: &[&Recipe]) -> BTreeSet<String> {
    recipes
        .iter()
        .flat_map(|recipe| recipe.ingredients.iter().chain(&recipe.products))
        .map(|amount| amount.material.clone())
        .collect()
}

/// The choices a catalog offers for building a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockOptions {
    /// Tier level -> sections of that tier
    pub tiers: BTreeMap<u32, BTreeSet<String>>,
    /// Research tree -> nodes of that tree
    pub research: BTreeMap<String, BTreeSet<String>>,
    pub alternates: BTreeSet<String>,
}

pub fn unlock_options(catalog: &Catalog) -> UnlockOptions {
    let mut options = UnlockOptions::default();

    for recipe in catalog.recipes() {
        let Some(gate) = recipe.unlock.gate() else {
            continue;
        };
        if let Some(tier) = &gate.tier {
            options
                .tiers
                .entry(tier.level)
                .or_default()
                .insert(tier.section.clone());
        }
        if let Some(research) = &gate.research {
            options
                .research
                .entry(research.tree.clone())
                .or_default()
                .insert(research.node.clone());
        }
        if gate.alternate {
            options.alternates.insert(recipe.name.clone());
        }
    }

    options
}

impl std::fmt::Display for UnlockOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tiers:")?;
        for (level, sections) in &self.tiers {
            writeln!(f, "  Tier {}", level)?;
            for section in sections {
                writeln!(f, "    {}", section)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "MAM Research:")?;
        for (tree, nodes) in &self.research {
            writeln!(f, "  {}", tree)?;
            for node in nodes {
                writeln!(f, "    {}", node)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Alternate recipes:")?;
        for name in &self.alternates {
            writeln!(f, "  {}", name)?;
        }
        Ok(())
    }
}
