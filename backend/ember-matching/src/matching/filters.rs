//! Candidate filter pipeline.
//!
//! Every filter extends a boxed diesel query; nothing is enumerated until the
//! pipeline materializes once with a truncating limit. Filters register in a
//! flat list sorted by `order` at construction.

use std::f64::consts::PI;

use chrono::{Duration, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Serialize;

use ember_shared::errors::{AppError, AppResult};

use crate::models::Profile;
use crate::schema::profiles;
use crate::DbPool;

pub type ProfileQuery<'a> = profiles::BoxedQuery<'a, Pg>;

/// Preference values treated as "open to everyone".
pub const EVERYONE_SYNONYMS: [&str; 4] = ["Everyone", "All", "Any", ""];

pub fn is_everyone(preference: &str) -> bool {
    EVERYONE_SYNONYMS.contains(&preference)
}

/// Lat/lon box around a point. `lonDelta` widens with latitude; the cosine is
/// clamped away from zero so polar coordinates do not blow the box up to NaN.
pub fn bounding_box(lat: f64, lon: f64, max_km: f64) -> ((f64, f64), (f64, f64)) {
    let lat_delta = max_km / 111.0;
    let cos_lat = (lat * PI / 180.0).cos().abs().max(1e-6);
    let lon_delta = max_km / (111.0 * cos_lat);
    ((lat - lat_delta, lat + lat_delta), (lon - lon_delta, lon + lon_delta))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterKind {
    Dealbreaker,
    Preference,
    Ranking,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterTrace {
    pub name: &'static str,
    pub kind: FilterKind,
    pub order: i32,
}

/// Everything a filter may consult. Swiped and blocked id sets come from the
/// external swipe/safety services and default to empty on upstream failure.
pub struct FilterContext {
    pub requester: Profile,
    pub swiped_ids: Vec<i64>,
    pub blocked_ids: Vec<i64>,
    pub active_within_days: Option<i64>,
    pub only_verified: bool,
}

pub trait CandidateFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn order(&self) -> i32;
    fn kind(&self) -> FilterKind;
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a>;
}

// ---------------------------------------------------------------------------
// Filters, in documented order
// ---------------------------------------------------------------------------

pub struct SelfExclusionFilter;

impl CandidateFilter for SelfExclusionFilter {
    fn name(&self) -> &'static str {
        "self_exclusion"
    }
    fn order(&self) -> i32 {
        0
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        query.filter(profiles::user_id.ne(ctx.requester.user_id))
    }
}

pub struct ActiveFilter;

impl CandidateFilter for ActiveFilter {
    fn name(&self) -> &'static str {
        "active"
    }
    fn order(&self) -> i32 {
        10
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, _ctx: &'a FilterContext) -> ProfileQuery<'a> {
        query.filter(profiles::is_active.eq(true))
    }
}

/// Bidirectional: the requester must want the candidate's gender AND the
/// candidate must want the requester's.
pub struct GenderFilter;

impl CandidateFilter for GenderFilter {
    fn name(&self) -> &'static str {
        "gender"
    }
    fn order(&self) -> i32 {
        20
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        let requester = &ctx.requester;
        let mut query = query;
        if !is_everyone(&requester.preferred_gender) {
            query = query.filter(profiles::gender.eq(requester.preferred_gender.clone()));
        }
        let mut accepted: Vec<String> =
            EVERYONE_SYNONYMS.iter().map(|s| s.to_string()).collect();
        accepted.push(requester.gender.clone());
        query.filter(profiles::preferred_gender.eq_any(accepted))
    }
}

/// Bidirectional: the candidate's age must sit in the requester's range and
/// vice versa.
pub struct AgeRangeFilter;

impl CandidateFilter for AgeRangeFilter {
    fn name(&self) -> &'static str {
        "age_range"
    }
    fn order(&self) -> i32 {
        30
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        let requester = &ctx.requester;
        query
            .filter(profiles::age.between(requester.min_age, requester.max_age))
            .filter(profiles::min_age.le(requester.age))
            .filter(profiles::max_age.ge(requester.age))
    }
}

pub struct ExcludeSwipedFilter;

impl CandidateFilter for ExcludeSwipedFilter {
    fn name(&self) -> &'static str {
        "exclude_swiped"
    }
    fn order(&self) -> i32 {
        40
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        if ctx.swiped_ids.is_empty() {
            return query;
        }
        query.filter(profiles::user_id.ne_all(ctx.swiped_ids.clone()))
    }
}

pub struct ExcludeBlockedFilter;

impl CandidateFilter for ExcludeBlockedFilter {
    fn name(&self) -> &'static str {
        "exclude_blocked"
    }
    fn order(&self) -> i32 {
        50
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        if ctx.blocked_ids.is_empty() {
            return query;
        }
        query.filter(profiles::user_id.ne_all(ctx.blocked_ids.clone()))
    }
}

/// Bounding box stand-in for radius search: haversine does not push down, a
/// box does. A non-positive max distance disables the filter.
pub struct DistanceFilter;

impl CandidateFilter for DistanceFilter {
    fn name(&self) -> &'static str {
        "distance"
    }
    fn order(&self) -> i32 {
        60
    }
    fn kind(&self) -> FilterKind {
        FilterKind::Dealbreaker
    }
    fn apply<'a>(&self, query: ProfileQuery<'a>, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        let requester = &ctx.requester;
        if requester.max_distance_km <= 0.0 {
            return query;
        }
        let ((min_lat, max_lat), (min_lon, max_lon)) = bounding_box(
            requester.latitude,
            requester.longitude,
            requester.max_distance_km,
        );
        query
            .filter(profiles::latitude.between(min_lat, max_lat))
            .filter(profiles::longitude.between(min_lon, max_lon))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct FilterPipeline {
    filters: Vec<Box<dyn CandidateFilter>>,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPipeline {
    pub fn new() -> Self {
        let mut filters: Vec<Box<dyn CandidateFilter>> = vec![
            Box::new(SelfExclusionFilter),
            Box::new(ActiveFilter),
            Box::new(GenderFilter),
            Box::new(AgeRangeFilter),
            Box::new(ExcludeSwipedFilter),
            Box::new(ExcludeBlockedFilter),
            Box::new(DistanceFilter),
        ];
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Execution-order trace, for observability.
    pub fn trace(&self) -> Vec<FilterTrace> {
        self.filters
            .iter()
            .map(|f| FilterTrace {
                name: f.name(),
                kind: f.kind(),
                order: f.order(),
            })
            .collect()
    }

    /// Composes the full candidate query without materializing anything.
    pub fn build<'a>(&self, ctx: &'a FilterContext) -> ProfileQuery<'a> {
        let mut query = profiles::table.into_boxed();
        for filter in &self.filters {
            query = filter.apply(query, ctx);
        }
        if let Some(days) = ctx.active_within_days {
            let cutoff = Utc::now() - Duration::days(days);
            query = query.filter(profiles::last_active_at.ge(cutoff));
        }
        if ctx.only_verified {
            query = query.filter(profiles::is_verified.eq(true));
        }
        query
    }

    /// Single materialization: ordered by user id (stable scan order) and
    /// truncated store-side.
    pub fn run(&self, pool: &DbPool, ctx: &FilterContext, limit: i64) -> AppResult<Vec<Profile>> {
        let mut conn = pool
            .get()
            .map_err(|e| AppError::internal(format!("database connection error: {e}")))?;
        let rows = self
            .build(ctx)
            .order(profiles::user_id.asc())
            .limit(limit)
            .load::<Profile>(&mut conn)?;
        Ok(rows)
    }

    /// Same pipeline restricted to a known id set; the pre-computed strategy
    /// uses this to re-check dealbreakers against cached candidates.
    pub fn run_restricted(
        &self,
        pool: &DbPool,
        ctx: &FilterContext,
        candidate_ids: &[i64],
        limit: i64,
    ) -> AppResult<Vec<Profile>> {
        if candidate_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = pool
            .get()
            .map_err(|e| AppError::internal(format!("database connection error: {e}")))?;
        let rows = self
            .build(ctx)
            .filter(profiles::user_id.eq_any(candidate_ids.to_vec()))
            .order(profiles::user_id.asc())
            .limit(limit)
            .load::<Profile>(&mut conn)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::test_support::profile;

    fn ctx(requester: Profile) -> FilterContext {
        FilterContext {
            requester,
            swiped_ids: vec![],
            blocked_ids: vec![],
            active_within_days: None,
            only_verified: false,
        }
    }

    #[test]
    fn filters_register_in_documented_order() {
        let pipeline = FilterPipeline::new();
        let trace = pipeline.trace();
        let orders: Vec<i32> = trace.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 10, 20, 30, 40, 50, 60]);
        let names: Vec<&str> = trace.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "self_exclusion",
                "active",
                "gender",
                "age_range",
                "exclude_swiped",
                "exclude_blocked",
                "distance"
            ]
        );
        assert!(trace.iter().all(|t| t.kind == FilterKind::Dealbreaker));
    }

    #[test]
    fn everyone_synonyms_cover_documented_values() {
        for synonym in ["Everyone", "All", "Any", ""] {
            assert!(is_everyone(synonym), "{synonym:?} should mean everyone");
        }
        assert!(!is_everyone("Female"));
        assert!(!is_everyone("everyone")); // synonyms are exact values
    }

    #[test]
    fn bounding_box_separates_near_from_far() {
        // Requester in Stockholm, 50 km radius: a point ~2 km away is inside
        // the box, Malmö (~500 km) is far outside.
        let ((min_lat, max_lat), (min_lon, max_lon)) = bounding_box(59.33, 18.07, 50.0);
        assert!(min_lat <= 59.35 && 59.35 <= max_lat);
        assert!(min_lon <= 18.10 && 18.10 <= max_lon);
        assert!(!(min_lat <= 55.60 && 55.60 <= max_lat));
    }

    #[test]
    fn bounding_box_widens_longitude_with_latitude() {
        let ((_, _), (min_lon_eq, max_lon_eq)) = bounding_box(0.0, 10.0, 50.0);
        let ((_, _), (min_lon_north, max_lon_north)) = bounding_box(60.0, 10.0, 50.0);
        assert!((max_lon_north - min_lon_north) > (max_lon_eq - min_lon_eq));
    }

    #[test]
    fn gender_filter_pushes_both_directions_into_sql() {
        let mut requester = profile(1);
        requester.gender = "Male".into();
        requester.preferred_gender = "Female".into();
        let ctx = ctx(requester);

        let query = GenderFilter.apply(crate::schema::profiles::table.into_boxed::<Pg>(), &ctx);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        // Candidate gender must equal the requester's preference, and the
        // candidate's own preference must be the requester's gender or an
        // everyone synonym.
        assert!(sql.contains("\"gender\""));
        assert!(sql.contains("\"preferred_gender\""));
        assert!(sql.contains("Female"));
        assert!(sql.contains("Male"));
        assert!(sql.contains("Everyone"));
    }

    #[test]
    fn gender_filter_skips_candidate_gender_check_for_everyone() {
        let mut requester = profile(1);
        requester.gender = "Male".into();
        requester.preferred_gender = "Everyone".into();
        let ctx = ctx(requester);

        let query = GenderFilter.apply(crate::schema::profiles::table.into_boxed::<Pg>(), &ctx);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(!sql.contains("\"gender\" ="));
        assert!(sql.contains("\"preferred_gender\""));
    }

    #[test]
    fn age_filter_is_bidirectional_in_sql() {
        let mut requester = profile(1);
        requester.age = 50;
        requester.min_age = 22;
        requester.max_age = 55;
        let ctx = ctx(requester);

        let query = AgeRangeFilter.apply(crate::schema::profiles::table.into_boxed::<Pg>(), &ctx);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        // Candidate age between 22 and 55; candidate's own range must admit 50.
        assert!(sql.contains("BETWEEN"));
        assert!(sql.contains("\"min_age\""));
        assert!(sql.contains("\"max_age\""));
    }

    #[test]
    fn swiped_and_blocked_filters_are_noops_when_empty() {
        let ctx = ctx(profile(1));
        let base = diesel::debug_query::<Pg, _>(&crate::schema::profiles::table.into_boxed::<Pg>())
            .to_string();
        let swiped =
            ExcludeSwipedFilter.apply(crate::schema::profiles::table.into_boxed::<Pg>(), &ctx);
        assert_eq!(diesel::debug_query::<Pg, _>(&swiped).to_string(), base);
    }

    #[test]
    fn distance_filter_disabled_for_non_positive_radius() {
        let mut requester = profile(1);
        requester.max_distance_km = 0.0;
        let ctx = ctx(requester);
        let base = diesel::debug_query::<Pg, _>(&crate::schema::profiles::table.into_boxed::<Pg>())
            .to_string();
        let query = DistanceFilter.apply(crate::schema::profiles::table.into_boxed::<Pg>(), &ctx);
        assert_eq!(diesel::debug_query::<Pg, _>(&query).to_string(), base);
    }

    #[test]
    fn full_pipeline_composes_without_materializing() {
        let mut requester = profile(1);
        requester.gender = "Male".into();
        requester.preferred_gender = "Female".into();
        let mut ctx = ctx(requester);
        ctx.swiped_ids = vec![7, 8];
        ctx.blocked_ids = vec![9];

        let pipeline = FilterPipeline::new();
        let sql = diesel::debug_query::<Pg, _>(&pipeline.build(&ctx)).to_string();
        assert!(sql.contains("\"is_active\""));
        assert!(sql.contains("\"latitude\""));
        assert!(sql.contains("\"longitude\""));
        // Both exclusion lists made it into the statement.
        assert!(sql.contains("!= ALL"));
    }
}
