//! End-to-end: snapshot → classify → filter → optimize → diff

use std::collections::{BTreeMap, BTreeSet};

use satisfactory_calculator::calculator::{material_balance, summarize};
use satisfactory_calculator::loader::{ExtractionPower, with_extraction_recipes};
use satisfactory_calculator::{
    Catalog, Demand, OptimizeError, SelectionSettings, UnlockSelection, classify, diff, filter,
    optimize,
};

const SNAPSHOT: &str = r#"[
  {
    "Recipe": "Iron Ingot",
    "Ingredients": [{"Material": "Iron Ore", "Quantity": 30.0}],
    "Produced in": [{"Machine": "Smelter", "Pwr Cons": 4.0}],
    "Products": [{"Material": "Iron Ingot", "Quantity": 30.0}],
    "Unlocked by": ""
  },
  {
    "Recipe": "Iron Plate",
    "Ingredients": [{"Material": "Iron Ingot", "Quantity": 30.0}],
    "Produced in": [{"Machine": "Constructor", "Pwr Cons": 4.0}],
    "Products": [{"Material": "Iron Plate", "Quantity": 20.0}],
    "Unlocked by": ""
  },
  {
    "Recipe": "Iron Rod",
    "Ingredients": [{"Material": "Iron Ingot", "Quantity": 15.0}],
    "Produced in": [{"Machine": "Constructor", "Pwr Cons": 4.0}],
    "Products": [{"Material": "Iron Rod", "Quantity": 15.0}],
    "Unlocked by": ""
  },
  {
    "Recipe": "Screw",
    "Ingredients": [{"Material": "Iron Rod", "Quantity": 10.0}],
    "Produced in": [{"Machine": "Constructor", "Pwr Cons": 4.0}],
    "Products": [{"Material": "Screw", "Quantity": 40.0}],
    "Unlocked by": ""
  },
  {
    "Recipe": "Reinforced Iron Plate",
    "Ingredients": [
      {"Material": "Iron Plate", "Quantity": 30.0},
      {"Material": "Screw", "Quantity": 60.0}
    ],
    "Produced in": [{"Machine": "Assembler", "Pwr Cons": 15.0}],
    "Products": [{"Material": "Reinforced Iron Plate", "Quantity": 5.0}],
    "Unlocked by": {"Tier": [{"Level": 0, "Section": "HUB Upgrade 5"}], "MAM Research": null, "Alternate": false}
  },
  {
    "Recipe": "Cast Screw Alternate",
    "Ingredients": [{"Material": "Iron Ingot", "Quantity": 12.5}],
    "Produced in": [{"Machine": "Constructor", "Pwr Cons": 4.0}],
    "Products": [{"Material": "Screw", "Quantity": 50.0}],
    "Unlocked by": {"Tier": null, "MAM Research": null, "Alternate": true}
  }
]"#;

fn catalog() -> Catalog {
    let catalog = Catalog::from_json_str(SNAPSHOT).unwrap();
    let power = ExtractionPower::default();
    with_extraction_recipes(&catalog, &power).unwrap()
}

#[test]
fn plans_reinforced_plates_from_ore() {
    let catalog = catalog();
    let materials = classify(&catalog);
    assert!(materials["Iron Ore"].is_base);
    assert!(materials["Reinforced Iron Plate"].is_end);

    let active = filter(&catalog, &UnlockSelection::Unconfigured);
    assert!(active.iter().all(|r| r.name != "Cast Screw Alternate"));

    let demand = Demand::new().with("Reinforced Iron Plate", 5.0);
    let solution = optimize(&active, &demand).unwrap();

    assert_eq!(solution.count("Reinforced Iron Plate"), 1);
    assert_eq!(solution.count("Iron Plate"), 2);
    assert_eq!(solution.count("Screw"), 2);
    assert_eq!(solution.count("Iron Rod"), 2);
    assert_eq!(solution.count("Iron Ingot"), 3);
    assert!(solution.count("Iron Ore Extraction") >= 90);

    let balance = material_balance(&solution, &active, &demand, &materials);
    assert!(balance.iter().all(|row| row.is_satisfied()), "{:?}", balance);

    let summary = summarize(&solution, &active);
    assert!(summary.to_string().starts_with("Total Power Consumption:"));
}

#[test]
fn opting_into_an_alternate_can_lower_power() {
    let catalog = catalog();
    let demand = Demand::new().with("Reinforced Iron Plate", 5.0);

    let standard = optimize(&filter(&catalog, &UnlockSelection::Unconfigured), &demand).unwrap();

    let with_alternate = UnlockSelection::Configured(SelectionSettings {
        alternates: BTreeSet::from(["Cast Screw Alternate".to_string()]),
        ..SelectionSettings::default()
    });
    let active = filter(&catalog, &with_alternate);
    assert!(active.iter().any(|r| r.name == "Cast Screw Alternate"));
    let alternate = optimize(&active, &demand).unwrap();

    assert!(alternate.total_power_mw <= standard.total_power_mw);
}

#[test]
fn tier_locked_target_is_unproducible() {
    let catalog = catalog();
    let selection = UnlockSelection::Configured(SelectionSettings {
        tier: Some(0),
        research: BTreeMap::new(),
        ..SelectionSettings::default()
    });
    let active = filter(&catalog, &selection);
    let result = optimize(&active, &Demand::new().with("Reinforced Iron Plate", 5.0));
    assert!(
        matches!(result, Err(OptimizeError::UnproducibleMaterial(ref m)) if m == "Reinforced Iron Plate"),
        "{:?}",
        result
    );
}

#[test]
fn imported_snapshot_differs_only_by_extraction_recipes() {
    let raw = Catalog::from_json_str(SNAPSHOT).unwrap();
    let completed = catalog();

    let report = diff(Some(&raw), &completed);
    assert_eq!(report.added, vec!["Iron Ore Extraction"]);
    assert!(report.removed.is_empty());
    assert!(report.changed.is_empty());

    assert_eq!(diff(Some(&completed), &completed).to_string(), "No differences found.");
}
