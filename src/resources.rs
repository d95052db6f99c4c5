//! Static game data: extraction caps and default machine power draw

/// Theoretical maximum extraction rates (per minute) for raw resources.
/// Membership forces a material to be classified as base.
pub const RESOURCE_MAXIMUMS: &[(&str, f64)] = &[
    ("Coal", 42300.0),
    ("Crude Oil", 12600.0),
    ("Nitrogen Gas", 12000.0),
    ("Bauxite", 12300.0),
    ("Copper Ore", 36900.0),
    ("Caterium Ore", 15000.0),
    ("Iron Ore", 92100.0),
    ("Uranium", 2100.0),
    ("Raw Quartz", 13500.0),
    ("SAM", 10200.0),
    ("Limestone", 69300.0),
    ("Sulfur", 10800.0),
    ("Water", 13125.0),
];

/// Power draw in MW for machines whose records carry no power figure.
/// Nuclear Power Plant is listed as a tiny consumer since generation is not modeled.
pub const MACHINE_POWER_CONSUMPTION: &[(&str, f64)] = &[
    ("Assembler", 15.0),
    ("Manufacturer", 55.0),
    ("Constructor", 4.0),
    ("Smelter", 4.0),
    ("Foundry", 16.0),
    ("Blender", 75.0),
    ("Packager", 10.0),
    ("Refinery", 30.0),
    ("Particle Accelerator", 1000.0),
    ("Nuclear Power Plant", 1.0),
    ("Converter", 250.0),
];

/// Machine name used for synthesized extraction recipes
pub const EXTRACTION_MACHINE: &str = "Resource Extraction";

/// Fallback for raw materials with no known extraction power; the high
/// figure keeps the optimizer away from it whenever another route exists.
pub const HAND_CRANK_MACHINE: &str = "Hand Crank";
pub const HAND_CRANK_POWER_MW: f64 = 10000.0;

/// Water pumps draw 10 MJ/min
pub const WATER_EXTRACTION_POWER_MW: f64 = 10.0 / 60.0;

/// Extraction cap for a raw resource, if it is one
pub fn extraction_cap(material: &str) -> Option<f64> {
    RESOURCE_MAXIMUMS
        .iter()
        .find(|(name, _)| *name == material)
        .map(|(_, cap)| *cap)
}

/// Default power draw for a machine, if known
pub fn machine_power(machine: &str) -> Option<f64> {
    MACHINE_POWER_CONSUMPTION
        .iter()
        .find(|(name, _)| *name == machine)
        .map(|(_, power)| *power)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(extraction_cap("Iron Ore"), Some(92100.0));
        assert_eq!(extraction_cap("Iron Ingot"), None);
        assert_eq!(machine_power("Smelter"), Some(4.0));
        assert_eq!(machine_power("Hand Crank"), None);
    }
}
