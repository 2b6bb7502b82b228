use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coalescer::Coalescer;
use crate::filter::apply_filters;
use crate::models::{DerivedOptions, FilterCriteria, PriceRange, Product};
use crate::options::derive_options;
use crate::traits::{QueryStore, ResultSink};
use crate::url_sync::{PriceFallback, QueryParams, read_criteria, write_criteria};

/// Tunables for a [`CatalogFilter`]
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub price_window: Duration,
    pub filter_window: Duration,
    pub price_fallback: PriceFallback,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            price_window: Duration::from_millis(300),
            filter_window: Duration::from_millis(100),
            price_fallback: PriceFallback::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No non-empty catalog has been seen yet
    Uninitialized,
    /// Price bounds seeded and location overlaid; filtering is live
    Active,
}

/// A user interaction with the filter sidebar
#[derive(Debug, Clone, PartialEq)]
pub enum FilterAction {
    ToggleCategory(String),
    ToggleBrand(String),
    SetPriceRange(PriceRange),
    SetDiscount(Option<u32>),
    ClearFilters,
}

/// Filter state for one catalog view, kept in sync with the location.
///
/// Every mutation of the criteria is followed by a recompute that hands the
/// filtered products to the sink. User edits are coalesced: price drags on
/// one channel, label and discount toggles on another. A commit always
/// writes the location before recomputing.
pub struct CatalogFilter {
    products: Arc<Vec<Product>>,
    options: DerivedOptions,
    criteria: FilterCriteria,
    phase: Phase,
    price_updates: Coalescer<PriceRange>,
    filter_updates: Coalescer<()>,
    price_fallback: PriceFallback,
    location: Arc<dyn QueryStore>,
    sink: Box<dyn ResultSink>,
}

impl CatalogFilter {
    pub fn new(location: Arc<dyn QueryStore>, sink: Box<dyn ResultSink>, options: EngineOptions) -> Self {
        Self {
            products: Arc::default(),
            options: derive_options(&[]),
            criteria: FilterCriteria::default(),
            phase: Phase::Uninitialized,
            price_updates: Coalescer::new(options.price_window),
            filter_updates: Coalescer::new(options.filter_window),
            price_fallback: options.price_fallback,
            location,
            sink,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn options(&self) -> &DerivedOptions {
        &self.options
    }

    /// Current query of the location this engine writes to
    pub fn query(&self) -> QueryParams {
        self.location.query()
    }

    /// Reacts to a new product collection from the store.
    ///
    /// The first non-empty collection activates the engine. Later changes
    /// keep the user's criteria and only re-filter; a price range still at
    /// the old bounds follows the new ones, and a narrowed range is clamped.
    pub fn products_changed(&mut self, products: Arc<Vec<Product>>) {
        if self.is_closed() {
            debug!("Catalog change ignored - filter engine is closed");
            return;
        }
        let previous_bounds = self.options.price_bounds;
        self.products = products;
        self.options = derive_options(&self.products);

        match self.phase {
            Phase::Uninitialized if self.products.is_empty() => {
                debug!("Catalog still empty - waiting before activating filters");
            }
            Phase::Uninitialized => self.activate(),
            Phase::Active => {
                let bounds = self.options.price_bounds;
                if self.criteria.price_range == previous_bounds {
                    self.criteria.price_range = bounds;
                } else if !self.products.is_empty() {
                    self.criteria.price_range = self.criteria.price_range.clamped_to(bounds);
                }
                info!("Catalog changed to {} products - reapplying filters", self.products.len());
                self.recompute();
            }
        }
    }

    /// Re-reads the location after a completed navigation.
    pub fn navigation_completed(&mut self) {
        if self.is_closed() {
            debug!("Navigation ignored - filter engine is closed");
            return;
        }
        if self.phase != Phase::Active || self.products.is_empty() {
            debug!("Navigation ignored - catalog not loaded");
            return;
        }

        // The location is now authoritative; stale edits must not overwrite it.
        self.price_updates.cancel();
        self.filter_updates.cancel();
        self.read_location();
    }

    /// Applies a user interaction received at `now`.
    pub fn handle(&mut self, action: FilterAction, now: Instant) {
        if self.phase != Phase::Active {
            warn!("Ignoring {:?} - filters are not active yet", action);
            return;
        }
        if self.is_closed() {
            warn!("Ignoring {:?} - filter engine is closed", action);
            return;
        }

        match action {
            FilterAction::ToggleCategory(label) => {
                toggle(&mut self.criteria.categories, label);
                self.schedule_filters(now);
            }
            FilterAction::ToggleBrand(label) => {
                toggle(&mut self.criteria.brands, label);
                self.schedule_filters(now);
            }
            FilterAction::SetDiscount(percent) => {
                self.criteria.discount_percent = percent;
                self.schedule_filters(now);
            }
            FilterAction::SetPriceRange(range) => {
                // The slider tracks the pointer immediately; only the commit waits.
                let range = range.clamped_to(self.options.price_bounds);
                self.criteria.price_range = range;
                self.price_updates.push(range, now);
                debug!(
                    "Price range {}..={} pending for {:?}",
                    range.min,
                    range.max,
                    self.price_updates.window()
                );
            }
            FilterAction::ClearFilters => self.clear_filters(),
        }
    }

    /// Resets every filter and empties the location query.
    pub fn clear_filters(&mut self) {
        if self.is_closed() {
            warn!("Ignoring clear - filter engine is closed");
            return;
        }
        self.price_updates.cancel();
        self.filter_updates.cancel();
        self.criteria = FilterCriteria::unconstrained(self.options.price_bounds);

        info!("Clearing all filters");
        self.location.replace(QueryParams::new());
        self.recompute();
    }

    /// Earliest instant at which a coalesced commit is due
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.price_updates.deadline(), self.filter_updates.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Commits whichever coalescing windows have elapsed at `now`.
    ///
    /// Both channels due at once share a single write and recompute. A
    /// pending range is clamped into the bounds of the catalog at commit time,
    /// unless the catalog is empty.
    pub fn fire_due(&mut self, now: Instant) {
        let range = self.price_updates.take_due(now);
        let filters = self.filter_updates.take_due(now).is_some();

        if let Some(range) = range {
            self.criteria.price_range = if self.products.is_empty() {
                range
            } else {
                range.clamped_to(self.options.price_bounds)
            };
        }
        match (range.is_some(), filters) {
            (true, true) => self.commit("price range and filters"),
            (true, false) => self.commit("price range"),
            (false, true) => self.commit("filters"),
            (false, false) => {}
        }
    }

    /// Drops pending commits and rejects further input.
    pub fn close(&mut self) {
        self.price_updates.close();
        self.filter_updates.close();
        info!("Filter engine closed");
    }

    fn is_closed(&self) -> bool {
        self.price_updates.is_closed()
    }

    fn activate(&mut self) {
        self.criteria.price_range = self.options.price_bounds;
        self.phase = Phase::Active;
        info!(
            "Filters active: {} products, {} categories, {} brands, price {}..={}",
            self.products.len(),
            self.options.categories.len(),
            self.options.brands.len(),
            self.options.price_bounds.min,
            self.options.price_bounds.max
        );
        self.read_location();
    }

    fn read_location(&mut self) {
        let params = self.location.query();
        self.criteria = read_criteria(
            &params,
            &self.criteria,
            self.options.price_bounds,
            self.price_fallback,
        );
        info!("Filters read from location '{}'", params);
        self.recompute();
    }

    fn schedule_filters(&mut self, now: Instant) {
        self.filter_updates.push((), now);
    }

    fn commit(&mut self, reason: &str) {
        let params = write_criteria(&self.criteria, self.options.price_bounds);
        info!("Committing {} - location '{}'", reason, params);
        self.location.replace(params);
        self.recompute();
    }

    fn recompute(&mut self) {
        let filtered = apply_filters(&self.products, &self.criteria);
        debug!("{} of {} products match", filtered.len(), self.products.len());
        self.sink.emit(filtered);
    }
}

fn toggle(labels: &mut Vec<String>, label: String) {
    if let Some(index) = labels.iter().position(|l| *l == label) {
        labels.remove(index);
    } else {
        labels.push(label);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::filter::tests::product;
    use crate::url_sync::location::MemoryLocation;

    /// Location that counts engine writes, including repeated ones
    struct CountingLocation {
        inner: MemoryLocation,
        writes: AtomicUsize,
    }

    impl CountingLocation {
        fn new(query: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryLocation::new(QueryParams::parse(query)),
                writes: AtomicUsize::new(0),
            })
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl QueryStore for CountingLocation {
        fn query(&self) -> QueryParams {
            self.inner.query()
        }

        fn replace(&self, params: QueryParams) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.replace(params);
        }
    }

    /// Records each emission together with the location at that moment
    #[derive(Clone)]
    struct RecordingSink {
        location: Arc<CountingLocation>,
        emitted: Arc<Mutex<Vec<(Vec<u64>, String)>>>,
    }

    impl ResultSink for RecordingSink {
        fn emit(&mut self, products: Vec<Product>) {
            let ids = products.iter().map(|p| p.id).collect();
            self.emitted
                .lock()
                .unwrap()
                .push((ids, self.location.query().to_string()));
        }
    }

    impl RecordingSink {
        fn take(&self) -> Vec<(Vec<u64>, String)> {
            std::mem::take(&mut *self.emitted.lock().unwrap())
        }
    }

    fn scenario_products() -> Arc<Vec<Product>> {
        Arc::new(vec![
            product(1, "Shoes", "A", 100.0, 80.0),
            product(2, "Shirts", "B", 50.0, 50.0),
        ])
    }

    fn engine(query: &str) -> (CatalogFilter, Arc<CountingLocation>, RecordingSink) {
        let location = CountingLocation::new(query);
        let sink = RecordingSink {
            location: location.clone(),
            emitted: Arc::default(),
        };
        let engine = CatalogFilter::new(location.clone(), Box::new(sink.clone()), EngineOptions::default());
        (engine, location, sink)
    }

    fn active_engine(query: &str) -> (CatalogFilter, Arc<CountingLocation>, RecordingSink) {
        let (mut engine, location, sink) = engine(query);
        engine.products_changed(scenario_products());
        sink.take();
        (engine, location, sink)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn stays_uninitialized_until_the_catalog_has_products() {
        let (mut engine, _, sink) = engine("");
        engine.products_changed(Arc::default());

        assert_eq!(engine.phase(), Phase::Uninitialized);
        assert!(sink.take().is_empty());

        engine.products_changed(scenario_products());
        assert_eq!(engine.phase(), Phase::Active);
        assert_eq!(sink.take(), vec![(vec![1, 2], String::new())]);
    }

    #[test]
    fn activation_seeds_bounds_then_overlays_the_location() {
        let (mut engine, location, sink) = engine("?category=Shoes&minPrice=60");
        engine.products_changed(scenario_products());

        assert_eq!(engine.criteria().categories, vec!["Shoes"]);
        assert_eq!(engine.criteria().price_range, PriceRange::new(60.0, 100.0));
        assert_eq!(sink.take().len(), 1);
        assert_eq!(location.writes(), 0);
    }

    #[test]
    fn selecting_a_category_then_clearing_restores_everything() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::ToggleCategory("Shoes".to_string()), t0);
        engine.fire_due(t0 + ms(100));
        assert_eq!(sink.take(), vec![(vec![1], "?category=Shoes".to_string())]);

        engine.handle(FilterAction::ClearFilters, t0 + ms(200));
        assert_eq!(sink.take(), vec![(vec![1, 2], String::new())]);
        assert_eq!(location.writes(), 2);
    }

    #[test]
    fn rapid_price_drags_commit_once_with_the_last_value() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        for (offset, max) in [(0, 95.0), (20, 90.0), (45, 75.0)] {
            engine.handle(FilterAction::SetPriceRange(PriceRange::new(50.0, max)), t0 + ms(offset));
            // The in-memory range follows every tick.
            assert_eq!(engine.criteria().price_range.max, max);
        }

        engine.fire_due(t0 + ms(300));
        assert!(sink.take().is_empty());
        assert_eq!(location.writes(), 0);

        assert_eq!(engine.next_deadline(), Some(t0 + ms(345)));
        engine.fire_due(t0 + ms(345));
        assert_eq!(sink.take(), vec![(vec![2], "?maxPrice=75".to_string())]);
        assert_eq!(location.writes(), 1);

        engine.fire_due(t0 + ms(1_000));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn toggles_inside_one_window_commit_once() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::ToggleCategory("Shoes".to_string()), t0);
        engine.handle(FilterAction::ToggleBrand("A".to_string()), t0 + ms(30));
        engine.handle(FilterAction::SetDiscount(Some(20)), t0 + ms(60));
        engine.fire_due(t0 + ms(159));
        assert_eq!(location.writes(), 0);

        engine.fire_due(t0 + ms(160));
        assert_eq!(
            sink.take(),
            vec![(vec![1], "?category=Shoes&brand=A&discountPercent=20".to_string())]
        );
        assert_eq!(location.writes(), 1);
    }

    #[test]
    fn toggling_twice_removes_the_label() {
        let (mut engine, _, _) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::ToggleBrand("A".to_string()), t0);
        engine.handle(FilterAction::ToggleBrand("B".to_string()), t0);
        engine.handle(FilterAction::ToggleBrand("A".to_string()), t0);
        assert_eq!(engine.criteria().brands, vec!["B"]);
    }

    #[test]
    fn clearing_twice_matches_clearing_once() {
        let (mut engine, _, _) = active_engine("?category=Shoes&brand=A&minPrice=70&discountPercent=10");
        engine.clear_filters();
        let once = engine.criteria().clone();
        engine.clear_filters();

        assert_eq!(engine.criteria(), &once);
        assert_eq!(once, FilterCriteria::unconstrained(PriceRange::new(50.0, 100.0)));
        assert!(engine.query().is_empty());
    }

    #[test]
    fn clearing_cancels_a_pending_price_commit() {
        let (mut engine, _, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::SetPriceRange(PriceRange::new(60.0, 70.0)), t0);
        engine.handle(FilterAction::ClearFilters, t0 + ms(10));
        sink.take();

        assert_eq!(engine.next_deadline(), None);
        engine.fire_due(t0 + ms(400));
        assert!(sink.take().is_empty());
        assert_eq!(engine.criteria().price_range, PriceRange::new(50.0, 100.0));
    }

    #[test]
    fn navigation_rereads_the_location_without_writing() {
        let (mut engine, location, sink) = active_engine("");
        location.inner.navigate(QueryParams::parse("brand=B"));

        engine.navigation_completed();
        assert_eq!(engine.criteria().brands, vec!["B"]);
        assert_eq!(sink.take(), vec![(vec![2], "?brand=B".to_string())]);
        assert_eq!(location.writes(), 0);
    }

    #[test]
    fn navigation_before_activation_is_ignored() {
        let (mut engine, _, sink) = engine("?brand=B");
        engine.navigation_completed();

        assert_eq!(engine.phase(), Phase::Uninitialized);
        assert!(engine.criteria().brands.is_empty());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn input_before_activation_is_ignored() {
        let (mut engine, location, _) = engine("");
        engine.handle(FilterAction::ToggleCategory("Shoes".to_string()), Instant::now());

        assert!(engine.criteria().categories.is_empty());
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(location.writes(), 0);
    }

    #[test]
    fn catalog_change_keeps_a_narrowed_range() {
        let (mut engine, _, sink) = active_engine("?minPrice=60");
        engine.products_changed(Arc::new(vec![
            product(1, "Shoes", "A", 100.0, 80.0),
            product(2, "Shirts", "B", 50.0, 50.0),
            product(3, "Hats", "C", 400.0, 200.0),
            product(4, "Hats", "C", 20.0, 10.0),
        ]));

        assert_eq!(engine.phase(), Phase::Active);
        assert_eq!(engine.criteria().price_range, PriceRange::new(60.0, 100.0));
        assert_eq!(sink.take(), vec![(vec![1], "?minPrice=60".to_string())]);
    }

    #[test]
    fn pending_price_drag_commits_inside_refreshed_bounds() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::SetPriceRange(PriceRange::new(50.0, 75.0)), t0);
        engine.products_changed(Arc::new(vec![
            product(3, "Hats", "C", 200.0, 150.0),
            product(4, "Hats", "C", 400.0, 300.0),
        ]));
        assert_eq!(sink.take(), vec![(vec![3], String::new())]);

        engine.fire_due(t0 + ms(300));
        let bounds = engine.options().price_bounds;
        let range = engine.criteria().price_range;
        assert_eq!(bounds, PriceRange::new(200.0, 400.0));
        assert!(range.min >= bounds.min && range.max <= bounds.max);
        assert_eq!(range, PriceRange::new(200.0, 200.0));
        assert_eq!(sink.take(), vec![(vec![3], "?maxPrice=200".to_string())]);
        assert_eq!(location.writes(), 1);
    }

    #[test]
    fn price_and_filters_due_together_commit_once() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::SetPriceRange(PriceRange::new(60.0, 100.0)), t0);
        engine.handle(FilterAction::ToggleCategory("Shoes".to_string()), t0 + ms(200));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(300)));

        engine.fire_due(t0 + ms(300));
        assert_eq!(sink.take(), vec![(vec![1], "?category=Shoes&minPrice=60".to_string())]);
        assert_eq!(location.writes(), 1);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn unconstrained_range_follows_new_bounds() {
        let (mut engine, _, sink) = active_engine("");
        engine.products_changed(Arc::new(vec![
            product(1, "Shoes", "A", 100.0, 80.0),
            product(3, "Hats", "C", 400.0, 200.0),
        ]));

        assert_eq!(engine.criteria().price_range, PriceRange::new(100.0, 400.0));
        assert_eq!(sink.take(), vec![(vec![1, 3], String::new())]);
    }

    #[test]
    fn emptied_catalog_emits_an_empty_result() {
        let (mut engine, _, sink) = active_engine("");
        engine.products_changed(Arc::default());

        assert_eq!(engine.phase(), Phase::Active);
        assert_eq!(sink.take(), vec![(vec![], String::new())]);
    }

    #[test]
    fn closing_drops_pending_commits_and_later_input() {
        let (mut engine, location, sink) = active_engine("");
        let t0 = Instant::now();

        engine.handle(FilterAction::ToggleCategory("Shoes".to_string()), t0);
        engine.close();
        engine.handle(FilterAction::ToggleBrand("A".to_string()), t0 + ms(1));
        engine.fire_due(t0 + ms(500));

        assert_eq!(engine.next_deadline(), None);
        assert_eq!(location.writes(), 0);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn closed_engine_ignores_clear_navigation_and_catalog_changes() {
        let (mut engine, location, sink) = active_engine("?brand=A");
        engine.close();

        engine.clear_filters();
        location.inner.navigate(QueryParams::parse("brand=B"));
        engine.navigation_completed();
        engine.products_changed(Arc::new(vec![product(3, "Hats", "C", 400.0, 200.0)]));

        assert_eq!(engine.criteria().brands, vec!["A"]);
        assert_eq!(engine.options().price_bounds, PriceRange::new(50.0, 100.0));
        assert_eq!(location.writes(), 0);
        assert!(sink.take().is_empty());
    }

    fn arb_action() -> impl Strategy<Value = FilterAction> {
        prop_oneof![
            prop::sample::select(vec!["Shoes", "Shirts"]).prop_map(|l| FilterAction::ToggleCategory(l.to_string())),
            prop::sample::select(vec!["A", "B"]).prop_map(|l| FilterAction::ToggleBrand(l.to_string())),
            (0u32..200, 0u32..200).prop_map(|(a, b)| {
                FilterAction::SetPriceRange(PriceRange::new(f64::from(a), f64::from(b)))
            }),
            prop::option::of(prop::sample::select(vec![10u32, 20, 30, 40, 50])).prop_map(FilterAction::SetDiscount),
        ]
    }

    proptest! {
        #[test]
        fn clear_is_idempotent_after_any_edits(
            actions in prop::collection::vec((arb_action(), 0u64..400), 0..12),
        ) {
            let (mut engine, _, sink) = active_engine("");
            let mut now = Instant::now();
            for (action, gap) in actions {
                now += ms(gap);
                engine.fire_due(now);
                engine.handle(action, now);
            }

            engine.clear_filters();
            let once = (engine.criteria().clone(), engine.query());
            engine.clear_filters();
            let twice = (engine.criteria().clone(), engine.query());

            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once.0, FilterCriteria::unconstrained(PriceRange::new(50.0, 100.0)));
            prop_assert!(once.1.is_empty());
            prop_assert_eq!(sink.take().last().map(|(ids, _)| ids.clone()), Some(vec![1, 2]));
        }
    }
}
