//! Init command implementation.

use super::StorePaths;
use std::error::Error;

/// Runs the init command.
pub fn run(stores: &StorePaths) -> Result<(), Box<dyn Error>> {
    let garden = stores.open(true)?;
    let config = garden.config();
    if let (Some(soil), Some(core)) = (config.soil.path(), config.core.path()) {
        println!("Soil store: {}", soil.display());
        println!("Core store: {}", core.display());
    }
    println!("Status:     {}", garden.status());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let soil = dir.path().join("nested/soil.db");
        let core = dir.path().join("core.db");
        let stores = StorePaths::resolve(Some(soil.clone()), Some(core.clone())).unwrap();

        run(&stores).unwrap();
        assert!(soil.exists());
        assert!(core.exists());
    }
}
