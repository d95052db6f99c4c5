//! Database schema and operations for the stored catalog and unlock selection

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::filter::{SelectionSettings, UnlockSelection};
use crate::models::{Catalog, Machine, MaterialAmount, Recipe, ResearchGate, TierGate, UnlockCondition, UnlockGate};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per recipe of the current catalog snapshot
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            machine TEXT NOT NULL,
            power_mw REAL NOT NULL,
            gated INTEGER NOT NULL DEFAULT 0,
            tier_level INTEGER,
            tier_section TEXT,
            research_tree TEXT,
            research_node TEXT,
            alternate INTEGER NOT NULL DEFAULT 0
        );

        -- What a recipe consumes per minute
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            recipe TEXT NOT NULL,
            position INTEGER NOT NULL,
            material TEXT NOT NULL,
            quantity REAL NOT NULL,
            PRIMARY KEY (recipe, position)
        );

        -- What a recipe produces per minute
        CREATE TABLE IF NOT EXISTS recipe_products (
            recipe TEXT NOT NULL,
            position INTEGER NOT NULL,
            material TEXT NOT NULL,
            quantity REAL NOT NULL,
            PRIMARY KEY (recipe, position)
        );

        -- The player's unlock selection; no row means never configured
        CREATE TABLE IF NOT EXISTS unlock_selection (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            settings TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_products_material ON recipe_products(material);
        CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_material ON recipe_ingredients(material);
        "#,
    )?;
    Ok(())
}

/// Replace the stored catalog wholesale
pub fn replace_catalog(conn: &Connection, catalog: &Catalog) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    clear_catalog(&tx)?;

    for (position, recipe) in catalog.recipes().iter().enumerate() {
        let gate = recipe.unlock.gate();
        let tier = gate.and_then(|g| g.tier.as_ref());
        let research = gate.and_then(|g| g.research.as_ref());
        tx.execute(
            "INSERT INTO recipes (name, position, machine, power_mw, gated, tier_level, tier_section,
                                  research_tree, research_node, alternate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            (
                &recipe.name,
                position as i64,
                &recipe.machine.name,
                recipe.machine.power_mw,
                gate.is_some(),
                tier.map(|t| t.level),
                tier.map(|t| t.section.as_str()),
                research.map(|r| r.tree.as_str()),
                research.map(|r| r.node.as_str()),
                recipe.unlock.is_alternate(),
            ),
        )?;
        insert_amounts(&tx, "recipe_ingredients", &recipe.name, &recipe.ingredients)?;
        insert_amounts(&tx, "recipe_products", &recipe.name, &recipe.products)?;
    }

    tx.commit()?;
    Ok(())
}

fn insert_amounts(conn: &Connection, table: &str, recipe: &str, amounts: &[MaterialAmount]) -> Result<()> {
    let sql = format!("INSERT INTO {table} (recipe, position, material, quantity) VALUES (?1, ?2, ?3, ?4)");
    let mut stmt = conn.prepare(&sql)?;
    for (position, amount) in amounts.iter().enumerate() {
        stmt.execute((recipe, position as i64, &amount.material, amount.quantity))?;
    }
    Ok(())
}

/// Clear the stored catalog
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_products;
        DELETE FROM recipe_ingredients;
        DELETE FROM recipes;
        "#,
    )?;
    Ok(())
}

/// Load the stored catalog, or `None` if nothing was imported yet
pub fn load_catalog(conn: &Connection) -> Result<Option<Catalog>> {
    let mut stmt = conn.prepare(
        "SELECT name, machine, power_mw, gated, tier_level, tier_section, research_tree, research_node, alternate
         FROM recipes
         ORDER BY position",
    )?;

    let rows = stmt.query_map([], |row| {
        let gated: bool = row.get(3)?;
        let tier_level: Option<u32> = row.get(4)?;
        let tier_section: Option<String> = row.get(5)?;
        let research_tree: Option<String> = row.get(6)?;
        let research_node: Option<String> = row.get(7)?;
        let alternate: bool = row.get(8)?;

        let unlock = if gated {
            UnlockCondition::Gated(UnlockGate {
                tier: tier_level
                    .zip(tier_section)
                    .map(|(level, section)| TierGate { level, section }),
                research: research_tree
                    .zip(research_node)
                    .map(|(tree, node)| ResearchGate { tree, node }),
                alternate,
            })
        } else {
            UnlockCondition::Always
        };

        Ok(Recipe {
            name: row.get(0)?,
            ingredients: Vec::new(),
            products: Vec::new(),
            machine: Machine {
                name: row.get(1)?,
                power_mw: row.get(2)?,
            },
            unlock,
        })
    })?;

    let mut recipes = Vec::new();
    for row in rows {
        let mut recipe = row?;
        recipe.ingredients = load_amounts(conn, "recipe_ingredients", &recipe.name)?;
        recipe.products = load_amounts(conn, "recipe_products", &recipe.name)?;
        recipes.push(recipe);
    }

    if recipes.is_empty() {
        return Ok(None);
    }
    let catalog = Catalog::from_recipes(recipes).context("Stored catalog is invalid")?;
    Ok(Some(catalog))
}

fn load_amounts(conn: &Connection, table: &str, recipe: &str) -> Result<Vec<MaterialAmount>> {
    let sql = format!("SELECT material, quantity FROM {table} WHERE recipe = ?1 ORDER BY position");
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map([recipe], |row| {
        Ok(MaterialAmount {
            material: row.get(0)?,
            quantity: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Load the player's unlock selection
pub fn load_selection(conn: &Connection) -> Result<UnlockSelection> {
    let settings: Option<String> = conn
        .query_row("SELECT settings FROM unlock_selection WHERE id = 1", [], |row| row.get(0))
        .optional()?;

    match settings {
        None => Ok(UnlockSelection::Unconfigured),
        Some(json) => {
            let settings: SelectionSettings =
                serde_json::from_str(&json).context("Stored unlock selection is invalid")?;
            Ok(UnlockSelection::Configured(settings))
        }
    }
}

/// Store the player's unlock selection; `Unconfigured` forgets it
pub fn save_selection(conn: &Connection, selection: &UnlockSelection) -> Result<()> {
    match selection {
        UnlockSelection::Unconfigured => {
            conn.execute("DELETE FROM unlock_selection", [])?;
        }
        UnlockSelection::Configured(settings) => {
            conn.execute(
                "INSERT OR REPLACE INTO unlock_selection (id, settings) VALUES (1, ?1)",
                [serde_json::to_string(settings)?],
            )?;
        }
    }
    Ok(())
}
