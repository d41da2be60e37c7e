//! The Kigali simulation engine facade: scope management, the recalc
//! pipeline, the user-level operations, and per-year result extraction.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod engine;
mod matcher;
pub mod ops;
pub mod recalc;
pub mod results;
pub mod scope;

pub use engine::{DisplaceTarget, DisplacementKind, Engine};
pub use matcher::YearMatcher;
pub use ops::Operation;
pub use results::{EngineResult, TradeSupplement};
pub use scope::Scope;

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::{Decimal, PercentBasis, Quantity, StreamKind, Units};
    use rust_decimal_macros::dec;
    use state::RecoveryStage;

    fn pct(amount: Decimal) -> Quantity {
        Quantity::new(amount, Units::Percent(PercentBasis::Unspecified))
    }

    fn kg_per_unit(amount: Decimal) -> Quantity {
        Quantity::new(amount, Units::KilogramsPerUnit)
    }

    /// Engine seeded like the single-substance steady-state scenario.
    fn seeded_engine() -> Engine {
        let mut engine = Engine::new(2025, 2035);
        engine.set_stanza("default");
        engine.set_application("Domestic Refrigeration");
        engine.set_substance("HFC-134a", false).unwrap();
        engine
            .enable(StreamKind::Domestic, YearMatcher::any())
            .unwrap();
        engine
            .set_initial_charge(kg_per_unit(dec!(0.15)), StreamKind::Domestic, YearMatcher::any())
            .unwrap();
        engine
            .set_stream(
                StreamKind::PriorEquipment,
                Quantity::new(dec!(1000000), Units::EquipmentUnits),
                YearMatcher::any(),
            )
            .unwrap();
        engine
            .recharge(pct(dec!(10)), kg_per_unit(dec!(0.15)), YearMatcher::any())
            .unwrap();
        engine
    }

    #[test]
    fn unit_based_sales_add_recharge_on_top() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(87000), Units::EquipmentUnits),
                YearMatcher::any(),
            )
            .unwrap();
        let state = engine.state();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        // 87,000 x 0.15 + 1,000,000 x 10 % x 0.15 = 13,050 + 15,000
        assert_eq!(
            state.stream(&key, StreamKind::Domestic).unwrap().amount(),
            dec!(28050)
        );
        assert_eq!(
            state
                .stream(&key, StreamKind::ImplicitRecharge)
                .unwrap()
                .amount(),
            dec!(15000)
        );
        assert_eq!(
            state
                .stream(&key, StreamKind::NewEquipment)
                .unwrap()
                .amount(),
            dec!(87000)
        );
    }

    #[test]
    fn volume_sales_produce_population_growth() {
        let mut engine = seeded_engine();
        engine
            .retire(pct(dec!(5)), false, YearMatcher::any())
            .unwrap();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(25), Units::MetricTons),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let state = engine.state();
        assert_eq!(
            state.stream(&key, StreamKind::Domestic).unwrap().amount(),
            dec!(25000)
        );
        // (25,000 - 15,000 recharge) / 0.15 new units; retired 50,000.
        let new_units = state
            .stream(&key, StreamKind::NewEquipment)
            .unwrap()
            .amount();
        assert_eq!(new_units.round_dp(2), dec!(66666.67));
        let equipment = state.stream(&key, StreamKind::Equipment).unwrap().amount();
        assert_eq!(equipment.round_dp(2), dec!(1016666.67));
    }

    #[test]
    fn setting_the_same_value_twice_is_idempotent() {
        let mut engine = seeded_engine();
        let value = Quantity::new(dec!(25), Units::MetricTons);
        engine
            .set_stream(StreamKind::Domestic, value, YearMatcher::any())
            .unwrap();
        let first = engine.state().clone();
        engine
            .set_stream(StreamKind::Domestic, value, YearMatcher::any())
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        assert_eq!(
            first.substance(&key).unwrap().streams,
            engine.state().substance(&key).unwrap().streams
        );
    }

    #[test]
    fn year_matcher_gates_operations() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(25), Units::MetricTons),
                YearMatcher::in_year(2030),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        assert!(engine
            .state()
            .stream(&key, StreamKind::Domestic)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn percent_change_compounds_on_last_specified() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        engine
            .change_stream(StreamKind::Domestic, pct(dec!(10)), YearMatcher::any())
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        assert_eq!(
            engine
                .state()
                .stream(&key, StreamKind::Domestic)
                .unwrap()
                .amount(),
            dec!(110)
        );
        engine
            .change_stream(StreamKind::Domestic, pct(dec!(10)), YearMatcher::any())
            .unwrap();
        assert_eq!(
            engine
                .state()
                .stream(&key, StreamKind::Domestic)
                .unwrap()
                .amount(),
            dec!(121)
        );
    }

    #[test]
    fn cap_at_current_value_is_a_noop() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let before = engine.state().substance(&key).unwrap().streams.clone();
        engine
            .cap(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
                None,
                DisplacementKind::Equivalent,
            )
            .unwrap();
        assert_eq!(engine.state().substance(&key).unwrap().streams, before);
    }

    #[test]
    fn floor_at_current_value_is_a_noop() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let before = engine.state().substance(&key).unwrap().streams.clone();
        engine
            .floor(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
                None,
                DisplacementKind::Equivalent,
            )
            .unwrap();
        assert_eq!(engine.state().substance(&key).unwrap().streams, before);
    }

    #[test]
    fn self_displacement_is_rejected_before_mutation() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let before = engine.state().substance(&key).unwrap().streams.clone();
        let err = engine
            .cap(
                StreamKind::Domestic,
                Quantity::new(dec!(50), Units::Kilograms),
                YearMatcher::any(),
                Some(DisplaceTarget::Stream(StreamKind::Domestic)),
                DisplacementKind::Equivalent,
            )
            .unwrap_err();
        assert!(matches!(err, primitives::EngineError::SelfDisplacement { .. }));
        assert_eq!(engine.state().substance(&key).unwrap().streams, before);
    }

    #[test]
    fn self_replacement_is_rejected() {
        let mut engine = seeded_engine();
        assert!(matches!(
            engine.replace(
                pct(dec!(10)),
                StreamKind::Sales,
                "HFC-134a",
                YearMatcher::any(),
            ),
            Err(primitives::EngineError::SelfReplacement { .. })
        ));
    }

    #[test]
    fn replace_of_zero_mass_is_a_noop() {
        let mut engine = seeded_engine();
        engine.set_substance("R-600a", false).unwrap();
        engine.set_substance("HFC-134a", false).unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let before = engine.state().substance(&key).unwrap().streams.clone();
        engine
            .replace(
                Quantity::new(dec!(0), Units::Kilograms),
                StreamKind::Sales,
                "R-600a",
                YearMatcher::any(),
            )
            .unwrap();
        assert_eq!(engine.state().substance(&key).unwrap().streams, before);
    }

    #[test]
    fn unit_based_displacement_converts_through_both_charges() {
        let mut engine = Engine::new(2025, 2035);
        engine.set_stanza("default");
        engine.set_application("AC");
        engine.set_substance("A", false).unwrap();
        engine.enable(StreamKind::Domestic, YearMatcher::any()).unwrap();
        engine
            .set_initial_charge(kg_per_unit(dec!(0.2)), StreamKind::Domestic, YearMatcher::any())
            .unwrap();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(100), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        engine.set_substance("B", false).unwrap();
        engine.enable(StreamKind::Domestic, YearMatcher::any()).unwrap();
        engine
            .set_initial_charge(kg_per_unit(dec!(0.1)), StreamKind::Domestic, YearMatcher::any())
            .unwrap();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(50), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();

        engine.set_substance("A", false).unwrap();
        engine
            .cap(
                StreamKind::Sales,
                Quantity::new(dec!(0), Units::EquipmentUnits),
                YearMatcher::any(),
                Some(DisplaceTarget::Substance("B".to_string())),
                DisplacementKind::ByUnits,
            )
            .unwrap();

        let a = primitives::SubstanceId::new("AC", "A");
        let b = primitives::SubstanceId::new("AC", "B");
        // A loses 100 kg = 500 units; B gains 500 units x 0.1 kg/unit.
        assert!(engine
            .state()
            .stream(&a, StreamKind::Domestic)
            .unwrap()
            .is_zero());
        assert_eq!(
            engine
                .state()
                .stream(&b, StreamKind::Domestic)
                .unwrap()
                .amount(),
            dec!(100)
        );
        // Scope restored to A after the displacement.
        assert_eq!(engine.scope().substance(), Some("A"));
    }

    #[test]
    fn equals_sets_gwp_and_refreshes_emissions() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(25), Units::MetricTons),
                YearMatcher::any(),
            )
            .unwrap();
        engine
            .equals(
                Quantity::new(dec!(1430), Units::KilogramsCo2ePerKilogram),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let state = engine.state();
        // 25 mt x 1430 tCO2e/mt
        assert_eq!(
            state
                .stream(&key, StreamKind::DomesticConsumption)
                .unwrap()
                .amount(),
            dec!(35750)
        );
        // Recharge demand 15,000 kg = 15 mt x 1430.
        assert_eq!(
            state
                .stream(&key, StreamKind::RechargeEmissions)
                .unwrap()
                .amount(),
            dec!(21450)
        );
    }

    #[test]
    fn enable_then_set_zero_matches_never_enabling() {
        let mut engine = Engine::new(2025, 2030);
        engine.set_stanza("default");
        engine.set_application("AC");
        engine.set_substance("A", false).unwrap();
        engine.enable(StreamKind::Import, YearMatcher::any()).unwrap();
        engine
            .set_stream(
                StreamKind::Import,
                Quantity::new(dec!(0), Units::Kilograms),
                YearMatcher::any(),
            )
            .unwrap();
        let key = primitives::SubstanceId::new("AC", "A");
        assert!(engine
            .state()
            .stream(&key, StreamKind::Import)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn reserved_variables_resolve_from_the_year_counters() {
        let mut engine = Engine::new(2025, 2030);
        engine.increment_year().unwrap();
        assert_eq!(
            engine.variable(scope::YEARS_ELAPSED).unwrap().amount(),
            dec!(1)
        );
        assert_eq!(
            engine.variable(scope::YEAR_ABSOLUTE).unwrap().amount(),
            dec!(2026)
        );
        assert!(engine
            .set_variable(scope::YEAR_ABSOLUTE, Quantity::new(dec!(0), Units::Years))
            .is_err());
    }

    #[test]
    fn eol_recycling_with_full_induction_leaves_virgin_sales_alone() {
        let mut engine = seeded_engine();
        engine
            .set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(25), Units::MetricTons),
                YearMatcher::any(),
            )
            .unwrap();
        engine.retire(pct(dec!(5)), false, YearMatcher::any()).unwrap();
        engine
            .recycle(pct(dec!(20)), pct(dec!(90)), RecoveryStage::Eol, YearMatcher::any())
            .unwrap();
        let key = primitives::SubstanceId::new("Domestic Refrigeration", "HFC-134a");
        let state = engine.state();
        assert_eq!(
            state.stream(&key, StreamKind::Domestic).unwrap().amount(),
            dec!(25000)
        );
        // 50,000 retired x 0.15 kg x 20 % x 90 %
        assert_eq!(
            state.stream(&key, StreamKind::RecycleEol).unwrap().amount(),
            dec!(1350)
        );
        assert_eq!(
            state.stream(&key, StreamKind::InductionEol).unwrap().amount(),
            dec!(1350)
        );
        // Recycled supply joins sales on read.
        assert_eq!(
            state.stream(&key, StreamKind::Sales).unwrap().amount(),
            dec!(26350)
        );
    }

    #[test]
    fn operations_without_scope_fail_cleanly() {
        let mut engine = Engine::new(2025, 2030);
        assert!(matches!(
            engine.set_stream(
                StreamKind::Domestic,
                Quantity::new(dec!(1), Units::Kilograms),
                YearMatcher::any(),
            ),
            Err(primitives::EngineError::MissingScope { .. })
        ));
        assert!(engine.set_substance("A", false).is_err());
    }

    #[test]
    fn check_valid_rejects_unknown_substances() {
        let mut engine = Engine::new(2025, 2030);
        engine.set_application("AC");
        assert!(matches!(
            engine.set_substance("Unknown", true),
            Err(primitives::EngineError::UnknownSubstance { .. })
        ));
        engine.set_substance("Known", false).unwrap();
        engine.set_substance("Known", true).unwrap();
    }

    #[test]
    fn operations_execute_through_the_typed_stream() {
        let mut engine = Engine::new(2025, 2026);
        let ops = [
            Operation::SetStanza("default".to_string()),
            Operation::SetApplication("AC".to_string()),
            Operation::SetSubstance {
                name: "A".to_string(),
                check_valid: false,
            },
            Operation::Enable {
                stream: StreamKind::Domestic,
                years: YearMatcher::any(),
            },
            Operation::InitialCharge {
                value: kg_per_unit(dec!(0.5)),
                stream: StreamKind::Domestic,
                years: YearMatcher::any(),
            },
            Operation::Set {
                stream: StreamKind::Domestic,
                value: Quantity::new(dec!(10), Units::Kilograms),
                years: YearMatcher::any(),
            },
            Operation::IncrementYear,
        ];
        engine.execute_all(&ops).unwrap();
        assert_eq!(engine.current_year(), 2026);
        let key = primitives::SubstanceId::new("AC", "A");
        // Carried over into the new year.
        assert_eq!(
            engine
                .state()
                .stream(&key, StreamKind::Domestic)
                .unwrap()
                .amount(),
            dec!(10)
        );
    }

    #[test]
    fn results_cover_every_registered_substance() {
        let mut engine = seeded_engine();
        engine.set_substance("R-600a", false).unwrap();
        engine.set_scenario("baseline", 3);
        let results = engine.get_results().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].substance, "HFC-134a");
        assert_eq!(results[1].substance, "R-600a");
        assert!(results.iter().all(|r| r.scenario == "baseline" && r.trial == 3));
    }
}
