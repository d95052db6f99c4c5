//! Minimum-power recipe optimization
//!
//! Turns the active recipes and a demand vector into an integer program
//! (one instance count per recipe, one balance constraint per material),
//! hands it to an [`IntegerSolver`] and reads the recipe mix back.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info};

use crate::classifier::MaterialInfo;
use crate::error::OptimizeError;
use crate::models::Recipe;
use crate::resources;
use crate::solver::{
    CancelToken, IntegerProgram, IntegerSolver, MicrolpSolver, Relation, SolveControl, SolveFailure,
};

const RATE_EPSILON: f64 = 1e-6;

/// Requested rate per material (per minute). Adding the same material
/// twice sums the rates, so requested and derived amounts can be merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demand(BTreeMap<String, f64>);

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, material: impl Into<String>, quantity: f64) {
        *self.0.entry(material.into()).or_insert(0.0) += quantity;
    }

    pub fn with(mut self, material: impl Into<String>, quantity: f64) -> Self {
        self.add(material, quantity);
        self
    }

    pub fn get(&self, material: &str) -> f64 {
        self.0.get(material).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(material, quantity)| (material.as_str(), *quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Demand {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut demand = Self::new();
        for (material, quantity) in iter {
            demand.add(material, quantity);
        }
        demand
    }
}

/// How raw resource extraction caps are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionCaps {
    /// Caps are only reported by [`material_balance`]
    #[default]
    Advisory,
    /// Extraction recipes may not exceed the cap of what they extract
    Enforced,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    /// Materials assumed freely available; they get no balance constraint
    pub free_materials: BTreeSet<String>,
    pub extraction_caps: ExtractionCaps,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

/// Instance count per active recipe and the resulting power draw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    pub counts: BTreeMap<String, u64>,
    pub total_power_mw: f64,
}

impl Solution {
    pub fn count(&self, recipe: &str) -> u64 {
        self.counts.get(recipe).copied().unwrap_or(0)
    }

    /// Recipes with at least one instance running
    pub fn running(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| (name.as_str(), *count))
    }
}

/// Build the integer program for `recipes` and `demand`.
///
/// Every material consumed by an active recipe, and every material named in
/// the demand (even at rate zero), gets `Σ count × net output ≥ demand`
/// unless it is listed as free. A constrained material nobody produces fails
/// fast.
pub fn build_program(
    recipes: &[&Recipe],
    demand: &Demand,
    options: &OptimizeOptions,
) -> Result<IntegerProgram, OptimizeError> {
    let mut needed: BTreeMap<&str, f64> = BTreeMap::new();
    for (material, quantity) in demand.iter() {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(OptimizeError::InvalidDemand {
                material: material.to_string(),
                quantity,
            });
        }
        needed.insert(material, quantity);
    }
    for recipe in recipes {
        for ingredient in &recipe.ingredients {
            needed.entry(ingredient.material.as_str()).or_insert(0.0);
        }
    }
    for free in &options.free_materials {
        needed.remove(free.as_str());
    }

    let mut program = IntegerProgram::default();
    for recipe in recipes {
        program.add_variable(recipe.name.as_str(), recipe.machine.power_mw);
    }

    for (material, requested) in needed {
        let mut terms = Vec::new();
        let mut producible = false;
        for (index, recipe) in recipes.iter().enumerate() {
            let produced = recipe.produced(material);
            let net = produced - recipe.consumed(material);
            producible |= produced > 0.0;
            if net != 0.0 {
                terms.push((index, net));
            }
        }
        if !producible {
            return Err(OptimizeError::UnproducibleMaterial(material.to_string()));
        }
        debug!(event = "balance_constraint", material, terms = terms.len(), demand = requested);
        program.add_constraint(format!("balance:{material}"), terms, Relation::AtLeast, requested);
    }

    if options.extraction_caps == ExtractionCaps::Enforced {
        let mut extractors: BTreeMap<&str, Vec<(usize, f64)>> = BTreeMap::new();
        for (index, recipe) in recipes.iter().enumerate() {
            if !recipe.is_extraction() {
                continue;
            }
            for product in &recipe.products {
                if resources::extraction_cap(&product.material).is_some() {
                    extractors
                        .entry(product.material.as_str())
                        .or_default()
                        .push((index, product.quantity));
                }
            }
        }
        for (material, terms) in extractors {
            if let Some(cap) = resources::extraction_cap(material) {
                program.add_constraint(format!("cap:{material}"), terms, Relation::AtMost, cap);
            }
        }
    }

    Ok(program)
}

/// Find the minimum-power recipe mix with the default solver backend
pub fn optimize(recipes: &[&Recipe], demand: &Demand) -> Result<Solution, OptimizeError> {
    optimize_with(&MicrolpSolver::default(), recipes, demand, &OptimizeOptions::default())
}

/// Find the minimum-power recipe mix using `solver`
pub fn optimize_with<S: IntegerSolver + ?Sized>(
    solver: &S,
    recipes: &[&Recipe],
    demand: &Demand,
    options: &OptimizeOptions,
) -> Result<Solution, OptimizeError> {
    let program = build_program(recipes, demand, options)?;
    info!(
        event = "optimize_start",
        recipes = program.variables.len(),
        constraints = program.constraints.len(),
    );

    let control = SolveControl::new(options.timeout, options.cancel.clone());
    let assignment = solver.solve(&program, &control).map_err(|failure| match failure {
        SolveFailure::Infeasible => OptimizeError::Infeasible,
        other => OptimizeError::Solver(other),
    })?;

    // A late cancellation still discards the result
    if control.is_cancelled() {
        return Err(OptimizeError::Solver(SolveFailure::Cancelled));
    }

    let mut counts = BTreeMap::new();
    let mut total_power_mw = 0.0;
    for (index, recipe) in recipes.iter().enumerate() {
        let count = assignment.value(index).map_or(0, to_count);
        *counts.entry(recipe.name.clone()).or_insert(0) += count;
        // Recomputed from counts rather than trusting the solver's objective
        total_power_mw += count as f64 * recipe.machine.power_mw;
    }

    let solution = Solution {
        counts,
        total_power_mw,
    };
    info!(
        event = "optimize_end",
        total_power_mw,
        running = solution.running().count(),
    );
    Ok(solution)
}

fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// A solution grouped by machine, for display
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub total_power_mw: f64,
    pub machines: BTreeMap<String, Vec<(String, u64)>>,
}

pub fn summarize(solution: &Solution, recipes: &[&Recipe]) -> PlanSummary {
    let mut machines: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
    for recipe in recipes {
        let count = solution.count(&recipe.name);
        if count > 0 {
            machines
                .entry(recipe.machine.name.clone())
                .or_default()
                .push((recipe.name.clone(), count));
        }
    }
    PlanSummary {
        total_power_mw: solution.total_power_mw,
        machines,
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total Power Consumption: {:.2} MW", self.total_power_mw)?;
        writeln!(f)?;
        for (machine, recipes) in &self.machines {
            writeln!(f, "[{}]", machine)?;
            for (recipe, count) in recipes {
                writeln!(f, "  {}: {}", recipe, count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Flow of one material under a solution
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBalance {
    pub material: String,
    pub produced: f64,
    pub consumed: f64,
    pub requested: f64,
    pub is_base: bool,
    pub extraction_cap: Option<f64>,
}

impl MaterialBalance {
    pub fn surplus(&self) -> f64 {
        self.produced - self.consumed - self.requested
    }

    pub fn is_satisfied(&self) -> bool {
        self.surplus() >= -RATE_EPSILON
    }

    /// Advisory: extraction above the theoretical cap of the map
    pub fn exceeds_cap(&self) -> bool {
        self.extraction_cap
            .is_some_and(|cap| self.produced > cap + RATE_EPSILON)
    }
}

/// Per-material produced/consumed/requested rates, sorted by material
pub fn material_balance(
    solution: &Solution,
    recipes: &[&Recipe],
    demand: &Demand,
    materials: &BTreeMap<String, MaterialInfo>,
) -> Vec<MaterialBalance> {
    let mut flows: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for recipe in recipes {
        let count = solution.count(&recipe.name) as f64;
        if count == 0.0 {
            continue;
        }
        for product in &recipe.products {
            flows.entry(product.material.as_str()).or_default().0 += count * product.quantity;
        }
        for ingredient in &recipe.ingredients {
            flows.entry(ingredient.material.as_str()).or_default().1 += count * ingredient.quantity;
        }
    }
    for (material, quantity) in demand.iter() {
        if quantity > 0.0 {
            flows.entry(material).or_default();
        }
    }

    flows
        .into_iter()
        .map(|(material, (produced, consumed))| {
            let info = materials.get(material);
            MaterialBalance {
                material: material.to_string(),
                produced,
                consumed,
                requested: demand.get(material),
                is_base: info.is_some_and(|i| i.is_base),
                extraction_cap: info
                    .and_then(|i| i.extraction_cap)
                    .or_else(|| resources::extraction_cap(material)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::classifier::classify;
    use crate::models::Catalog;
    use crate::solver::Assignment;

    /// Records the program it is given and answers with a fixed script
    struct ScriptedSolver {
        answer: Result<Assignment, SolveFailure>,
        seen: RefCell<Option<IntegerProgram>>,
        cancel_during_solve: Option<CancelToken>,
    }

    impl ScriptedSolver {
        fn returning(values: Vec<Option<f64>>) -> Self {
            Self {
                answer: Ok(Assignment { values }),
                seen: RefCell::new(None),
                cancel_during_solve: None,
            }
        }

        fn failing(failure: SolveFailure) -> Self {
            Self {
                answer: Err(failure),
                seen: RefCell::new(None),
                cancel_during_solve: None,
            }
        }

        fn program(&self) -> IntegerProgram {
            self.seen.borrow().clone().expect("solver was not invoked")
        }
    }

    impl IntegerSolver for ScriptedSolver {
        fn solve(&self, program: &IntegerProgram, _: &SolveControl) -> Result<Assignment, SolveFailure> {
            *self.seen.borrow_mut() = Some(program.clone());
            if let Some(token) = &self.cancel_during_solve {
                token.cancel();
            }
            self.answer.clone()
        }
    }

    fn smelter() -> Recipe {
        Recipe::new("R", "Smelter", 4.0)
            .with_ingredient("IronOre", 2.0)
            .with_product("IronIngot", 1.0)
    }

    fn ore_extraction() -> Recipe {
        Recipe::new("IronOre Extraction", "Resource Extraction", 0.0).with_product("IronOre", 1.0)
    }

    fn foundry() -> Recipe {
        Recipe::new("Big Smelter", "Foundry", 15.0)
            .with_ingredient("IronOre", 3.0)
            .with_product("IronIngot", 4.0)
    }

    #[test]
    fn missing_upstream_recipe_is_unproducible() {
        let r = smelter();
        let solver = ScriptedSolver::returning(vec![]);
        let result = optimize_with(
            &solver,
            &[&r],
            &Demand::new().with("IronIngot", 1.0),
            &OptimizeOptions::default(),
        );
        assert!(matches!(result, Err(OptimizeError::UnproducibleMaterial(m)) if m == "IronOre"));
        assert!(solver.seen.borrow().is_none(), "must fail before solving");
    }

    #[test]
    fn builds_objective_and_balance_constraints() {
        let (r, e) = (smelter(), ore_extraction());
        let solver = ScriptedSolver::returning(vec![Some(1.0), Some(2.0)]);
        let solution = optimize_with(
            &solver,
            &[&r, &e],
            &Demand::new().with("IronIngot", 1.0),
            &OptimizeOptions::default(),
        )
        .unwrap();

        let program = solver.program();
        assert_eq!(program.variables.len(), 2);
        assert_eq!(program.variables[0].cost, 4.0);
        assert_eq!(program.variables[1].cost, 0.0);
        assert_eq!(program.constraints.len(), 2);

        let ingot = program.constraint("balance:IronIngot").unwrap();
        assert_eq!(ingot.terms, vec![(0, 1.0)]);
        assert_eq!(ingot.relation, Relation::AtLeast);
        assert_eq!(ingot.rhs, 1.0);

        let ore = program.constraint("balance:IronOre").unwrap();
        assert_eq!(ore.terms, vec![(0, -2.0), (1, 1.0)]);
        assert_eq!(ore.rhs, 0.0);

        assert_eq!(solution.count("R"), 1);
        assert_eq!(solution.count("IronOre Extraction"), 2);
        assert_eq!(solution.total_power_mw, 4.0);
    }

    #[test]
    fn counts_come_from_assignment_and_power_is_recomputed() {
        let (r, e) = (smelter(), ore_extraction());
        let solver = ScriptedSolver::returning(vec![Some(2.9999999), None]);
        let solution = optimize_with(
            &solver,
            &[&r, &e],
            &Demand::new().with("IronIngot", 1.0),
            &OptimizeOptions::default(),
        )
        .unwrap();
        assert_eq!(solution.count("R"), 3);
        assert_eq!(solution.count("IronOre Extraction"), 0);
        assert_eq!(solution.total_power_mw, 12.0);
        assert_eq!(solution.running().collect::<Vec<_>>(), vec![("R", 3)]);
    }

    #[test]
    fn solver_failures_are_mapped() {
        let (r, e) = (smelter(), ore_extraction());
        let demand = Demand::new().with("IronIngot", 1.0);

        let infeasible = ScriptedSolver::failing(SolveFailure::Infeasible);
        assert!(matches!(
            optimize_with(&infeasible, &[&r, &e], &demand, &OptimizeOptions::default()),
            Err(OptimizeError::Infeasible)
        ));

        let broken = ScriptedSolver::failing(SolveFailure::Backend("boom".to_string()));
        assert!(matches!(
            optimize_with(&broken, &[&r, &e], &demand, &OptimizeOptions::default()),
            Err(OptimizeError::Solver(SolveFailure::Backend(_)))
        ));
    }

    #[test]
    fn cancellation_discards_the_solution() {
        let (r, e) = (smelter(), ore_extraction());
        let token = CancelToken::new();
        let mut solver = ScriptedSolver::returning(vec![Some(1.0), Some(2.0)]);
        solver.cancel_during_solve = Some(token.clone());
        let options = OptimizeOptions {
            cancel: Some(token),
            ..OptimizeOptions::default()
        };
        assert!(matches!(
            optimize_with(&solver, &[&r, &e], &Demand::new().with("IronIngot", 1.0), &options),
            Err(OptimizeError::Solver(SolveFailure::Cancelled))
        ));
    }

    #[test]
    fn invalid_demand_is_rejected() {
        let (r, e) = (smelter(), ore_extraction());
        let result = build_program(
            &[&r, &e],
            &Demand::new().with("IronIngot", -1.0),
            &OptimizeOptions::default(),
        );
        assert!(matches!(result, Err(OptimizeError::InvalidDemand { .. })));
    }

    #[test]
    fn zero_rate_demand_is_still_checked() {
        let (r, e) = (smelter(), ore_extraction());
        let demand = Demand::new().with("IronIngot", 1.0).with("Unobtainium", 0.0);
        let result = build_program(&[&r, &e], &demand, &OptimizeOptions::default());
        assert!(matches!(result, Err(OptimizeError::UnproducibleMaterial(m)) if m == "Unobtainium"));

        let demand = Demand::new().with("IronIngot", 0.0);
        let program = build_program(&[&r, &e], &demand, &OptimizeOptions::default()).unwrap();
        assert_eq!(program.constraint("balance:IronIngot").unwrap().rhs, 0.0);
        assert_eq!(optimize(&[&r, &e], &demand).unwrap().total_power_mw, 0.0);
    }

    #[test]
    fn free_materials_get_no_constraint() {
        let r = smelter();
        let options = OptimizeOptions {
            free_materials: BTreeSet::from(["IronOre".to_string()]),
            ..OptimizeOptions::default()
        };
        let program = build_program(&[&r], &Demand::new().with("IronIngot", 1.0), &options).unwrap();
        assert!(program.constraint("balance:IronOre").is_none());
        assert!(program.constraint("balance:IronIngot").is_some());
    }

    #[test]
    fn enforced_caps_limit_extraction() {
        let r = smelter();
        let e = Recipe::new("Iron Ore Extraction", "Resource Extraction", 0.1).with_product("Iron Ore", 1.0);
        let r = Recipe {
            ingredients: vec![crate::models::MaterialAmount::new("Iron Ore", 2.0)],
            ..r
        };
        let demand = Demand::new().with("IronIngot", 1.0);

        let advisory = build_program(&[&r, &e], &demand, &OptimizeOptions::default()).unwrap();
        assert!(advisory.constraint("cap:Iron Ore").is_none());

        let options = OptimizeOptions {
            extraction_caps: ExtractionCaps::Enforced,
            ..OptimizeOptions::default()
        };
        let enforced = build_program(&[&r, &e], &demand, &options).unwrap();
        let cap = enforced.constraint("cap:Iron Ore").unwrap();
        assert_eq!(cap.relation, Relation::AtMost);
        assert_eq!(cap.rhs, 92100.0);
        assert_eq!(cap.terms, vec![(1, 1.0)]);

        // 50000 ingots need 100000 ore, above the cap
        let too_much = Demand::new().with("IronIngot", 50000.0);
        assert!(matches!(
            optimize_with(&MicrolpSolver::default(), &[&r, &e], &too_much, &options),
            Err(OptimizeError::Infeasible)
        ));
    }

    #[test]
    fn real_solver_finds_minimum_power() {
        let (r, e) = (smelter(), ore_extraction());
        let solution = optimize(&[&r, &e], &Demand::new().with("IronIngot", 1.0)).unwrap();
        assert_eq!(solution.count("R"), 1);
        assert!(solution.count("IronOre Extraction") >= 2);
        assert_eq!(solution.total_power_mw, 4.0);
    }

    #[test]
    fn demand_above_a_million_is_feasible() {
        let e = Recipe::new("IronOre Extraction", "Resource Extraction", 0.5).with_product("IronOre", 1.0);
        let solution = optimize(&[&e], &Demand::new().with("IronOre", 2_000_000.0)).unwrap();
        assert_eq!(solution.count("IronOre Extraction"), 2_000_000);
        assert_eq!(solution.total_power_mw, 1_000_000.0);
    }

    #[test]
    fn more_demand_never_costs_less_power() {
        let (r, big, e) = (smelter(), foundry(), ore_extraction());
        let recipes = [&r, &big, &e];
        let powers: Vec<f64> = (1..=8)
            .map(|ingots| {
                optimize(&recipes, &Demand::new().with("IronIngot", ingots as f64))
                    .unwrap()
                    .total_power_mw
            })
            .collect();
        assert_eq!(powers, vec![4.0, 8.0, 12.0, 15.0, 19.0, 23.0, 27.0, 30.0]);
        assert!(powers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn resolving_gives_same_power() {
        let (r, big, e) = (smelter(), foundry(), ore_extraction());
        let recipes = [&r, &big, &e];
        let demand = Demand::new().with("IronIngot", 6.0);
        let first = optimize(&recipes, &demand).unwrap();
        let second = optimize(&recipes, &demand).unwrap();
        assert_eq!(first.total_power_mw, second.total_power_mw);
    }

    #[test]
    fn summary_and_balance() {
        let (r, e) = (smelter(), ore_extraction());
        let recipes = [&r, &e];
        let catalog = Catalog::from_recipes(vec![r.clone(), e.clone()]).unwrap();
        let materials = classify(&catalog);
        let demand = Demand::new().with("IronIngot", 1.0);
        let solution = Solution {
            counts: BTreeMap::from([("R".to_string(), 1), ("IronOre Extraction".to_string(), 2)]),
            total_power_mw: 4.0,
        };

        let summary = summarize(&solution, &recipes);
        assert_eq!(
            summary.to_string(),
            "Total Power Consumption: 4.00 MW\n\n[Resource Extraction]\n  IronOre Extraction: 2\n\n[Smelter]\n  R: 1\n\n"
        );

        let balance = material_balance(&solution, &recipes, &demand, &materials);
        assert_eq!(balance.len(), 2);
        let ingot = &balance[0];
        assert_eq!(ingot.material, "IronIngot");
        assert_eq!((ingot.produced, ingot.consumed, ingot.requested), (1.0, 0.0, 1.0));
        assert!(ingot.is_satisfied());
        let ore = &balance[1];
        assert_eq!(ore.material, "IronOre");
        assert_eq!((ore.produced, ore.consumed), (2.0, 2.0));
        assert!(ore.is_satisfied());
        assert!(!ore.exceeds_cap());
    }

    #[test]
    fn demand_merges_repeated_materials() {
        let demand: Demand = vec![("Wire", 10.0), ("Wire", 5.0), ("Cable", 1.0)]
            .into_iter()
            .collect();
        assert_eq!(demand.get("Wire"), 15.0);
        assert_eq!(demand.get("Cable"), 1.0);
        assert_eq!(demand.get("Rotor"), 0.0);
    }
}
