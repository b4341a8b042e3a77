//! End-to-end shipping scenarios: destination to zone to priced carriers.

#![allow(clippy::unwrap_used)]

use oceane_core::cart::{Cart, CartLine};
use oceane_core::shipping::{
    Destination, LOCAL_CARRIER_ID, RateEngine, RatePolicy, ZoneKey, ZoneTable, is_local_free_delivery,
    resolve_zone,
};
use oceane_core::{CountryCode, Money, ProductId};

fn dest(country: &str, city: &str) -> Destination {
    Destination::new(CountryCode::parse(country).unwrap(), Some(city.to_owned()))
}

fn line(id: &str, price: i64) -> CartLine {
    CartLine {
        product_id: ProductId::new(id),
        name: format!("Perle {id}"),
        unit_price: Money::from_minor(price),
        category: None,
    }
}

// =============================================================================
// Home zone
// =============================================================================

#[test]
fn test_papeete_ships_free_without_a_carrier() {
    for policy in [RatePolicy::Threshold, RatePolicy::ZoneGated] {
        let engine = RateEngine::with_default_carriers(policy, Some(Money::from_minor(50_000)));
        let mut cart = Cart::new();
        cart.add(line("1", 6_000), &engine).unwrap();
        cart.add(line("2", 4_000), &engine).unwrap();
        cart.set_destination(dest("PF", "Papeete"), &engine);

        assert_eq!(resolve_zone("PF"), ZoneKey::Local);
        let pf = CountryCode::parse("PF").unwrap();
        assert!(is_local_free_delivery(pf, Some("Papeete")));

        let options = cart.shipping_options(&engine).unwrap();
        assert!(options.local_free_delivery);
        assert!(options.carriers.is_empty());

        let amounts = cart.checkout_amounts().unwrap();
        assert_eq!(amounts.shipping, Money::ZERO);
        assert_eq!(amounts.total, Money::from_minor(10_000));
        assert_eq!(amounts.carrier_id, None);
    }
}

#[test]
fn test_outlying_home_island_needs_the_local_carrier() {
    let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, None);
    let options = engine.options(&dest("PF", "Rangiroa"), Money::from_minor(10_000));

    assert_eq!(options.zone, ZoneKey::Local);
    assert!(!options.local_free_delivery);
    let ids: Vec<_> = options.carriers.iter().map(|c| c.carrier_id.as_str()).collect();
    assert_eq!(ids, [LOCAL_CARRIER_ID]);
}

// =============================================================================
// Threshold policy
// =============================================================================

#[test]
fn test_anchorage_adds_city_surcharge_below_threshold() {
    let engine = RateEngine::with_default_carriers(RatePolicy::Threshold, Some(Money::from_minor(20_000)));
    let options = engine.options(&dest("US", "Anchorage"), Money::from_minor(10_000));

    assert_eq!(options.zone, ZoneKey::NorthAmerica);
    let colissimo = options
        .carriers
        .iter()
        .find(|c| c.carrier_id == "colissimo")
        .unwrap();
    assert_eq!(colissimo.cost, Money::from_minor(5_500));
    assert!(!colissimo.is_free);
    assert_eq!(colissimo.free_from, Some(Money::from_minor(20_000)));
}

#[test]
fn test_threshold_cost_never_rises_with_subtotal() {
    let threshold = Money::from_minor(20_000);
    let engine = RateEngine::with_default_carriers(RatePolicy::Threshold, Some(threshold));
    let destination = dest("DE", "Dresden");

    for carrier in engine.available_carriers(&destination) {
        let mut previous = None;
        for subtotal in (0..=30_000).step_by(2_500) {
            let subtotal = Money::from_minor(subtotal);
            let quote = engine
                .quote(carrier, destination.zone(), subtotal, &destination)
                .unwrap();
            if let Some(previous) = previous {
                assert!(quote.cost <= previous, "{} rose at {subtotal:?}", carrier.id);
            }
            if subtotal >= threshold {
                assert_eq!(quote.cost, Money::ZERO);
                assert!(quote.is_free);
            }
            previous = Some(quote.cost);
        }
    }
}

// =============================================================================
// Zone-gated policy
// =============================================================================

#[test]
fn test_zone_gated_ignores_subtotal() {
    let engine = RateEngine::with_default_carriers(RatePolicy::ZoneGated, Some(Money::from_minor(1)));
    let destination = dest("JP", "Tokyo");

    let small = engine.options(&destination, Money::from_minor(100));
    let large = engine.options(&destination, Money::from_minor(1_000_000));

    assert_eq!(small.zone, ZoneKey::Asia);
    assert_eq!(small.carriers, large.carriers);
    assert!(small.carriers.iter().all(|c| !c.is_free && c.free_from.is_none()));
    assert!(small.carriers.iter().all(|c| c.carrier_id != LOCAL_CARRIER_ID));
}

#[test]
fn test_unlisted_country_falls_back_to_world() {
    let table = ZoneTable::defaults();
    assert_eq!(table.resolve("BR"), ZoneKey::World);
    assert_eq!(table.resolve("fr"), ZoneKey::Europe);
    assert_eq!(table.resolve("NZ"), ZoneKey::Pacific);
}
