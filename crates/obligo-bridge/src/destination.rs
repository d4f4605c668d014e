//! Delivery-destination resolution for penalty aggregation.
//!
//! Destination inference is a best-effort heuristic over counterparty names,
//! not a specified mapping, so it lives behind a trait: swap in a real
//! assignment source (shipping schedule, CRM) without touching the bridge.

use obligo_model::Contract;
use serde::{Deserialize, Serialize};

/// Known river delivery destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Nola,
    Stl,
    Mem,
}

impl Destination {
    pub const ALL: [Destination; 3] = [Destination::Nola, Destination::Stl, Destination::Mem];

    /// The sell-price variable a penalty at this destination reduces.
    pub fn sell_variable(self) -> &'static str {
        match self {
            Destination::Nola => "sell_nola",
            Destination::Stl => "sell_stl",
            Destination::Mem => "sell_mem",
        }
    }
}

/// Strategy for assigning a sale contract to a delivery destination.
/// `None` means undetermined; the bridge then splits exposure evenly.
pub trait DestinationResolver {
    fn resolve(&self, contract: &Contract) -> Option<Destination>;
}

/// Default resolver: case-insensitive substring match on the counterparty
/// name. Best-effort only.
#[derive(Debug, Default)]
pub struct NameHeuristicResolver;

impl DestinationResolver for NameHeuristicResolver {
    fn resolve(&self, contract: &Contract) -> Option<Destination> {
        let name = contract.counterparty.to_lowercase();
        const TABLE: &[(&str, Destination)] = &[
            ("st. louis", Destination::Stl),
            ("st louis", Destination::Stl),
            ("memphis", Destination::Mem),
            ("nola", Destination::Nola),
            ("new orleans", Destination::Nola),
        ];
        TABLE
            .iter()
            .find(|(needle, _)| name.contains(needle))
            .map(|(_, dest)| *dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obligo_model::CounterpartyType;

    fn contract(counterparty: &str) -> Contract {
        Contract::draft(counterparty, CounterpartyType::Customer, "ammonia")
    }

    #[test]
    fn name_heuristic_resolves_known_substrings() {
        let resolver = NameHeuristicResolver;
        assert_eq!(
            resolver.resolve(&contract("St. Louis Terminal Co")),
            Some(Destination::Stl)
        );
        assert_eq!(
            resolver.resolve(&contract("MEMPHIS AG SUPPLY")),
            Some(Destination::Mem)
        );
        assert_eq!(
            resolver.resolve(&contract("New Orleans Barge Lines")),
            Some(Destination::Nola)
        );
        assert_eq!(resolver.resolve(&contract("Prairie Trading LLC")), None);
    }

    #[test]
    fn custom_resolver_plugs_in() {
        struct AlwaysMem;
        impl DestinationResolver for AlwaysMem {
            fn resolve(&self, _: &Contract) -> Option<Destination> {
                Some(Destination::Mem)
            }
        }
        assert_eq!(
            AlwaysMem.resolve(&contract("anything")),
            Some(Destination::Mem)
        );
    }
}
