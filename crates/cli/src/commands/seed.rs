use stockplan_db::repositories::unit::DEFAULT_UNITS;
use stockplan_db::repositories::SqlUnitRepository;

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |pool| async move {
        SqlUnitRepository::new(pool)
            .seed_defaults()
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))
    });

    match result {
        Ok(inserted) => {
            CommandResult::success("seed", seed_message(inserted, DEFAULT_UNITS.len()))
        }
        Err(failure) => failure,
    }
}

fn seed_message(inserted: u64, total: usize) -> String {
    let names: Vec<&str> = DEFAULT_UNITS.iter().map(|(_, name)| *name).collect();
    format!(
        "unit master ready: {inserted} of {total} canonical units inserted ({})",
        names.join(", ")
    )
}
