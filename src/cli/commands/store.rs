use super::AppContext;
use crate::cli::parser::{Commands, StoreAction};
use crate::errors::{AppError, AppResult};
use crate::models::{Coordinates, Store};
use crate::ui::messages::{info, success, warning};
use crate::utils::colors::{CYAN, GREY, RESET};
use crate::utils::formatting::pad_right;

pub fn handle(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::Store { action } = cmd else {
        return Ok(());
    };
    let backend = ctx.require_local("store management")?;

    match action {
        StoreAction::Add {
            id,
            name,
            lat,
            lon,
            address,
        } => {
            if id.trim().is_empty() || name.trim().is_empty() {
                return Err(AppError::Other("store id and name must not be empty".into()));
            }
            let coordinates = Coordinates::new(*lat, *lon)
                .map_err(|e| AppError::InvalidCoordinates(e.message().to_string()))?;
            let store = Store {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
                address: address.clone(),
                coordinates,
            };
            backend.add_store(&store)?;
            success(format!("Store '{}' added ({})", store.id, store.name));
        }
        StoreAction::List => {
            let stores = backend.stores()?;
            if stores.is_empty() {
                info(format!("No stores for tenant '{}'", backend.tenant_id()));
                return Ok(());
            }

            let id_w = stores.iter().map(|s| s.id.len()).max().unwrap_or(2).max(2);
            let name_w = stores.iter().map(|s| s.name.len()).max().unwrap_or(4).max(4);

            println!(
                "{}{}  {}  {:>10}  {:>11}  address{}",
                CYAN,
                pad_right("id", id_w),
                pad_right("name", name_w),
                "lat",
                "lon",
                RESET
            );
            for s in &stores {
                let address = if s.address.is_empty() {
                    format!("{GREY}--{RESET}")
                } else {
                    s.address.clone()
                };
                println!(
                    "{}  {}  {:>10.6}  {:>11.6}  {}",
                    pad_right(&s.id, id_w),
                    pad_right(&s.name, name_w),
                    s.coordinates.latitude,
                    s.coordinates.longitude,
                    address
                );
            }
        }
        StoreAction::Remove { id } => {
            if backend.remove_store(id)? {
                success(format!("Store '{id}' removed"));
            } else {
                warning(format!("Store '{id}' not found"));
            }
        }
    }

    Ok(())
}
