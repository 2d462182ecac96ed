// Property tests for geometry, opening hours and the osmChange renderer.
// Run with: cargo test -p aedsync-recon --test properties

use proptest::prelude::*;

use aedsync_recon::geo::{distance_m, Boundary, Coordinate};
use aedsync_recon::model::{DayHours, RegisterAed, WeeklyHours};
use aedsync_recon::plan::{ChangePlan, PlannedCreate, PlannedDelete, PlannedNode};
use aedsync_recon::render::render_osc;
use aedsync_recon::synth::opening_hours;
use aedsync_recon::tags::Tags;

fn coordinate() -> impl Strategy<Value = Coordinate> {
    (-80.0f64..80.0, -179.0f64..179.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
}

fn hhmm() -> impl Strategy<Value = i64> {
    (0i64..24, prop::sample::select(vec![0i64, 15, 30, 45])).prop_map(|(h, m)| h * 100 + m)
}

fn aed_with_hours(hours: WeeklyHours) -> RegisterAed {
    RegisterAed {
        guid: "g".into(),
        coordinate: Coordinate::new(59.9, 10.75),
        site_name: None,
        floor: None,
        description: None,
        manufacturer: None,
        model: None,
        hours,
        hours_limited: Some(true),
        closed_on_holidays: None,
    }
}

proptest! {
    #[test]
    fn distance_is_symmetric_and_non_negative(a in coordinate(), b in coordinate()) {
        let ab = distance_m(a, b);
        let ba = distance_m(b, a);
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert!(distance_m(a, a) < 1e-9);
    }

    #[test]
    fn square_boundary_matches_bounds_check(lat in 58.0f64..61.0, lon in 9.0f64..12.0) {
        let boundary = Boundary::from_geojson(
            r#"{"type":"Polygon","coordinates":[[[10,59],[11,59],[11,60],[10,60],[10,59]]]}"#,
        )
        .unwrap();
        let inside = (59.0..=60.0).contains(&lat) && (10.0..=11.0).contains(&lon);
        prop_assert_eq!(boundary.contains(Coordinate::new(lat, lon)), inside);
    }

    #[test]
    fn opening_hours_rules_are_well_formed(
        days in prop::collection::vec(prop::option::of((hhmm(), hhmm())), 7)
    ) {
        let mut hours = WeeklyHours::default();
        for (slot, day) in hours.days.iter_mut().zip(&days) {
            if let Some((open, close)) = day {
                *slot = DayHours { open: Some(*open), close: Some(*close) };
            }
        }
        if let Some(value) = opening_hours(&aed_with_hours(hours)) {
            prop_assert!(!value.is_empty());
            prop_assert!(!value.ends_with(';'));
            if value != "24/7" {
                for rule in value.split("; ") {
                    prop_assert!(rule.contains(' '), "rule without interval: {}", rule);
                }
            }
        }
    }

    #[test]
    fn osc_lists_every_planned_node(creates in 0usize..6, deletes in 0usize..6) {
        let mut plan = ChangePlan::default();
        for i in 0..creates {
            let id = plan.next_placeholder_id();
            plan.create.push(PlannedCreate {
                register_ref: format!("c{i}"),
                node: PlannedNode { id, lat: 59.0, lon: 10.0, version: None, tags: Tags::new() },
            });
        }
        for i in 0..deletes {
            plan.delete.push(PlannedDelete {
                register_ref: format!("d{i}"),
                node: PlannedNode { id: 100 + i as i64, lat: 59.0, lon: 10.0, version: Some(2), tags: Tags::new() },
            });
        }
        let osc = render_osc(&plan, None);
        prop_assert_eq!(osc.matches("<node ").count(), creates + deletes);
        prop_assert_eq!(osc.contains("<create>"), creates > 0);
        prop_assert_eq!(osc.contains("<delete"), deletes > 0);
        for i in 1..=creates {
            let needle = format!("id=\"-{}\"", i);
            prop_assert!(osc.contains(&needle));
        }
    }
}
