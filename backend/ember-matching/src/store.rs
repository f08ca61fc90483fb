//! Query API over the tables owned by the matching engine.
//!
//! Every other component reads and writes the candidate store through these
//! functions; none of them hands out write handles (readers use plain loads,
//! batch mutations run inside a single transaction).

use chrono::{DateTime, Duration, Utc};
use diesel::dsl::{count_star, exists, max, not};
use diesel::prelude::*;
use diesel::upsert::excluded;

use ember_shared::errors::{AppError, AppResult};

use crate::models::{
    AlgorithmMetric, DailyPick, Match, NewDailyPick, NewMatch, NewPrecomputedScore,
    NewUserInteraction, PrecomputedScore, Profile,
};
use crate::schema::{
    algorithm_metrics, daily_picks, matches, precomputed_scores, profiles, user_interactions,
};
use crate::DbPool;

fn conn(pool: &DbPool) -> AppResult<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
    pool.get()
        .map_err(|e| AppError::internal(format!("database connection error: {e}")))
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

pub fn profile_by_user_id(pool: &DbPool, user_id: i64) -> AppResult<Option<Profile>> {
    let mut conn = conn(pool)?;
    let profile = profiles::table
        .filter(profiles::user_id.eq(user_id))
        .first::<Profile>(&mut conn)
        .optional()?;
    Ok(profile)
}

pub fn profiles_by_user_ids(pool: &DbPool, user_ids: &[i64]) -> AppResult<Vec<Profile>> {
    if user_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut conn = conn(pool)?;
    let found = profiles::table
        .filter(profiles::user_id.eq_any(user_ids))
        .load::<Profile>(&mut conn)?;
    Ok(found)
}

pub fn active_profile_count(pool: &DbPool) -> AppResult<i64> {
    let mut conn = conn(pool)?;
    let count = profiles::table
        .filter(profiles::is_active.eq(true))
        .count()
        .get_result(&mut conn)?;
    Ok(count)
}

pub fn active_user_ids(pool: &DbPool) -> AppResult<Vec<i64>> {
    let mut conn = conn(pool)?;
    let ids = profiles::table
        .filter(profiles::is_active.eq(true))
        .order(profiles::user_id.asc())
        .select(profiles::user_id)
        .load::<i64>(&mut conn)?;
    Ok(ids)
}

/// Activity ping. Unknown users update zero rows and are silently ignored.
pub fn touch_last_active(pool: &DbPool, user_id: i64, at: DateTime<Utc>) -> AppResult<bool> {
    let mut conn = conn(pool)?;
    let updated = diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::last_active_at.eq(Some(at)),
            profiles::updated_at.eq(at),
        ))
        .execute(&mut conn)?;
    Ok(updated > 0)
}

/// Batch activity ping; returns how many of the given ids actually exist.
pub fn touch_last_active_batch(
    pool: &DbPool,
    user_ids: &[i64],
    at: DateTime<Utc>,
) -> AppResult<usize> {
    if user_ids.is_empty() {
        return Ok(0);
    }
    let mut conn = conn(pool)?;
    let updated = diesel::update(profiles::table.filter(profiles::user_id.eq_any(user_ids)))
        .set((
            profiles::last_active_at.eq(Some(at)),
            profiles::updated_at.eq(at),
        ))
        .execute(&mut conn)?;
    Ok(updated)
}

pub fn update_desirability(pool: &DbPool, user_id: i64, score: f64) -> AppResult<()> {
    let mut conn = conn(pool)?;
    diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::desirability_score.eq(score.clamp(0.0, 100.0)),
            profiles::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
    Ok(())
}

/// Account-deletion cascade: the profile goes inactive and the user's
/// matches, interactions, picks and score rows are removed in one
/// transaction.
pub fn cascade_delete_user(pool: &DbPool, user_id: i64) -> AppResult<usize> {
    let mut conn = conn(pool)?;
    let removed_matches = conn.transaction::<usize, diesel::result::Error, _>(|conn| {
        diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
            .set((
                profiles::is_active.eq(false),
                profiles::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        let removed = diesel::delete(
            matches::table.filter(
                matches::user1_id.eq(user_id).or(matches::user2_id.eq(user_id)),
            ),
        )
        .execute(conn)?;

        diesel::delete(
            user_interactions::table.filter(
                user_interactions::user_id
                    .eq(user_id)
                    .or(user_interactions::target_user_id.eq(user_id)),
            ),
        )
        .execute(conn)?;

        diesel::delete(
            daily_picks::table.filter(
                daily_picks::user_id
                    .eq(user_id)
                    .or(daily_picks::candidate_user_id.eq(user_id)),
            ),
        )
        .execute(conn)?;

        diesel::delete(
            precomputed_scores::table.filter(
                precomputed_scores::user_id
                    .eq(user_id)
                    .or(precomputed_scores::target_user_id.eq(user_id)),
            ),
        )
        .execute(conn)?;

        Ok(removed)
    })?;
    Ok(removed_matches)
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// Idempotent canonical-pair upsert. Returns the row and whether it was
/// freshly inserted.
pub fn upsert_match(pool: &DbPool, new_match: NewMatch) -> AppResult<(Match, bool)> {
    let mut conn = conn(pool)?;
    let inserted = diesel::insert_into(matches::table)
        .values(&new_match)
        .on_conflict((matches::user1_id, matches::user2_id))
        .do_nothing()
        .execute(&mut conn)?;

    let row = matches::table
        .filter(matches::user1_id.eq(new_match.user1_id))
        .filter(matches::user2_id.eq(new_match.user2_id))
        .first::<Match>(&mut conn)?;

    Ok((row, inserted > 0))
}

pub fn delete_matches_for_user(pool: &DbPool, user_id: i64) -> AppResult<usize> {
    let mut conn = conn(pool)?;
    let removed = diesel::delete(
        matches::table.filter(matches::user1_id.eq(user_id).or(matches::user2_id.eq(user_id))),
    )
    .execute(&mut conn)?;
    Ok(removed)
}

pub struct MatchStats {
    pub total_matches: i64,
    pub active_matches: i64,
    pub average_compatibility_score: Option<f64>,
    pub last_match_at: Option<DateTime<Utc>>,
    pub top_reasons: Vec<String>,
}

pub fn match_stats(pool: &DbPool, user_id: i64) -> AppResult<MatchStats> {
    let mut conn = conn(pool)?;
    let either_side = || matches::user1_id.eq(user_id).or(matches::user2_id.eq(user_id));

    let total_matches: i64 = matches::table
        .filter(either_side())
        .count()
        .get_result(&mut conn)?;

    let active_matches: i64 = matches::table
        .filter(either_side())
        .filter(matches::is_active.eq(true))
        .count()
        .get_result(&mut conn)?;

    let average_compatibility_score: Option<f64> = matches::table
        .filter(either_side())
        .select(diesel::dsl::avg(matches::compatibility_score))
        .first(&mut conn)?;

    let last_match_at: Option<DateTime<Utc>> = matches::table
        .filter(either_side())
        .select(max(matches::created_at))
        .first(&mut conn)?;

    let top_reasons: Vec<String> = matches::table
        .filter(either_side())
        .group_by(matches::match_source)
        .select(matches::match_source)
        .order(count_star().desc())
        .limit(3)
        .load(&mut conn)?;

    Ok(MatchStats {
        total_matches,
        active_matches,
        average_compatibility_score,
        last_match_at,
        top_reasons,
    })
}

// ---------------------------------------------------------------------------
// Precomputed scores
// ---------------------------------------------------------------------------

/// Read-through lookup for a single directional pair: the newest valid row
/// no older than `ttl_hours`.
pub fn fresh_pair_score(
    pool: &DbPool,
    user_id: i64,
    target_user_id: i64,
    ttl_hours: i64,
) -> AppResult<Option<PrecomputedScore>> {
    let mut conn = conn(pool)?;
    let cutoff = Utc::now() - Duration::hours(ttl_hours);
    let row = precomputed_scores::table
        .filter(precomputed_scores::user_id.eq(user_id))
        .filter(precomputed_scores::target_user_id.eq(target_user_id))
        .filter(precomputed_scores::is_valid.eq(true))
        .filter(precomputed_scores::calculated_at.gt(cutoff))
        .order(precomputed_scores::calculated_at.desc())
        .first::<PrecomputedScore>(&mut conn)
        .optional()?;
    Ok(row)
}

/// The newest valid rows for one requester, best overall first.
pub fn fresh_scores_for_user(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
    ttl_hours: i64,
) -> AppResult<Vec<PrecomputedScore>> {
    let mut conn = conn(pool)?;
    let cutoff = Utc::now() - Duration::hours(ttl_hours);
    let rows = precomputed_scores::table
        .filter(precomputed_scores::user_id.eq(user_id))
        .filter(precomputed_scores::is_valid.eq(true))
        .filter(precomputed_scores::calculated_at.gt(cutoff))
        .order(precomputed_scores::overall_score.desc())
        .limit(limit)
        .load::<PrecomputedScore>(&mut conn)?;
    Ok(rows)
}

pub fn upsert_score(pool: &DbPool, row: NewPrecomputedScore) -> AppResult<()> {
    let mut conn = conn(pool)?;
    upsert_score_on(&mut conn, &row)?;
    Ok(())
}

/// One transaction per scored user - the refresher saves changes once.
pub fn upsert_scores_batch(pool: &DbPool, rows: &[NewPrecomputedScore]) -> AppResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut conn = conn(pool)?;
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        for row in rows {
            upsert_score_on(conn, row)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn upsert_score_on(
    conn: &mut PgConnection,
    row: &NewPrecomputedScore,
) -> Result<(), diesel::result::Error> {
    diesel::insert_into(precomputed_scores::table)
        .values(row)
        .on_conflict((
            precomputed_scores::user_id,
            precomputed_scores::target_user_id,
        ))
        .do_update()
        .set((
            precomputed_scores::overall_score.eq(excluded(precomputed_scores::overall_score)),
            precomputed_scores::location_score.eq(excluded(precomputed_scores::location_score)),
            precomputed_scores::age_score.eq(excluded(precomputed_scores::age_score)),
            precomputed_scores::interests_score.eq(excluded(precomputed_scores::interests_score)),
            precomputed_scores::education_score.eq(excluded(precomputed_scores::education_score)),
            precomputed_scores::lifestyle_score.eq(excluded(precomputed_scores::lifestyle_score)),
            precomputed_scores::activity_score.eq(excluded(precomputed_scores::activity_score)),
            precomputed_scores::calculated_at.eq(excluded(precomputed_scores::calculated_at)),
            precomputed_scores::is_valid.eq(excluded(precomputed_scores::is_valid)),
        ))
        .execute(conn)?;
    Ok(())
}

/// A new swipe invalidates both directions of the pair.
pub fn invalidate_pair_scores(pool: &DbPool, user_id: i64, target_user_id: i64) -> AppResult<usize> {
    let mut conn = conn(pool)?;
    let invalidated = diesel::update(
        precomputed_scores::table.filter(
            precomputed_scores::user_id
                .eq(user_id)
                .and(precomputed_scores::target_user_id.eq(target_user_id))
                .or(precomputed_scores::user_id
                    .eq(target_user_id)
                    .and(precomputed_scores::target_user_id.eq(user_id))),
        ),
    )
    .set(precomputed_scores::is_valid.eq(false))
    .execute(&mut conn)?;
    Ok(invalidated)
}

/// Active users without a single valid score row, user-id ascending,
/// optionally resuming after a checkpoint.
pub fn users_never_scored(
    pool: &DbPool,
    only_active: bool,
    after_user_id: Option<i64>,
    limit: i64,
) -> AppResult<Vec<i64>> {
    let mut conn = conn(pool)?;
    let mut query = profiles::table
        .filter(not(exists(
            precomputed_scores::table
                .filter(precomputed_scores::user_id.eq(profiles::user_id))
                .filter(precomputed_scores::is_valid.eq(true)),
        )))
        .select(profiles::user_id)
        .into_boxed();
    if only_active {
        query = query.filter(profiles::is_active.eq(true));
    }
    if let Some(after) = after_user_id {
        query = query.filter(profiles::user_id.gt(after));
    }
    let ids = query
        .order(profiles::user_id.asc())
        .limit(limit)
        .load::<i64>(&mut conn)?;
    Ok(ids)
}

/// Users that do have valid rows, oldest newest-score first. Ties on the
/// aggregate resolve by user id so a cycle is deterministic.
pub fn users_by_score_staleness(
    pool: &DbPool,
    only_active: bool,
    limit: i64,
) -> AppResult<Vec<i64>> {
    let mut conn = conn(pool)?;
    let ids = if only_active {
        precomputed_scores::table
            .filter(precomputed_scores::is_valid.eq(true))
            .filter(exists(
                profiles::table
                    .filter(profiles::user_id.eq(precomputed_scores::user_id))
                    .filter(profiles::is_active.eq(true)),
            ))
            .group_by(precomputed_scores::user_id)
            .select(precomputed_scores::user_id)
            .order((
                max(precomputed_scores::calculated_at).asc(),
                precomputed_scores::user_id.asc(),
            ))
            .limit(limit)
            .load::<i64>(&mut conn)?
    } else {
        precomputed_scores::table
            .filter(precomputed_scores::is_valid.eq(true))
            .group_by(precomputed_scores::user_id)
            .select(precomputed_scores::user_id)
            .order((
                max(precomputed_scores::calculated_at).asc(),
                precomputed_scores::user_id.asc(),
            ))
            .limit(limit)
            .load::<i64>(&mut conn)?
    };
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Daily picks
// ---------------------------------------------------------------------------

pub fn delete_expired_picks(pool: &DbPool, now: DateTime<Utc>) -> AppResult<usize> {
    let mut conn = conn(pool)?;
    let removed = diesel::delete(daily_picks::table.filter(daily_picks::expires_at.lt(now)))
        .execute(&mut conn)?;
    Ok(removed)
}

pub fn insert_picks(pool: &DbPool, picks: &[NewDailyPick]) -> AppResult<()> {
    if picks.is_empty() {
        return Ok(());
    }
    let mut conn = conn(pool)?;
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(daily_picks::table)
            .values(picks)
            .execute(conn)?;
        Ok(())
    })?;
    Ok(())
}

/// Servable picks: unexpired and not yet acted on, best rank first.
pub fn servable_picks(
    pool: &DbPool,
    user_id: i64,
    now: DateTime<Utc>,
    limit: i64,
) -> AppResult<Vec<DailyPick>> {
    let mut conn = conn(pool)?;
    let rows = daily_picks::table
        .filter(daily_picks::user_id.eq(user_id))
        .filter(daily_picks::expires_at.gt(now))
        .filter(daily_picks::acted.eq(false))
        .order(daily_picks::rank.asc())
        .limit(limit)
        .load::<DailyPick>(&mut conn)?;
    Ok(rows)
}

pub fn count_unseen_picks(pool: &DbPool, user_id: i64, now: DateTime<Utc>) -> AppResult<i64> {
    let mut conn = conn(pool)?;
    let count = daily_picks::table
        .filter(daily_picks::user_id.eq(user_id))
        .filter(daily_picks::expires_at.gt(now))
        .filter(daily_picks::acted.eq(false))
        .filter(daily_picks::seen.eq(false))
        .count()
        .get_result(&mut conn)?;
    Ok(count)
}

pub fn mark_picks_seen(pool: &DbPool, pick_ids: &[i64]) -> AppResult<()> {
    if pick_ids.is_empty() {
        return Ok(());
    }
    let mut conn = conn(pool)?;
    diesel::update(daily_picks::table.filter(daily_picks::id.eq_any(pick_ids)))
        .set(daily_picks::seen.eq(true))
        .execute(&mut conn)?;
    Ok(())
}

/// A like/pass on a served pick retires it from the queue.
pub fn mark_pick_acted(pool: &DbPool, user_id: i64, candidate_user_id: i64) -> AppResult<()> {
    let mut conn = conn(pool)?;
    diesel::update(
        daily_picks::table
            .filter(daily_picks::user_id.eq(user_id))
            .filter(daily_picks::candidate_user_id.eq(candidate_user_id)),
    )
    .set(daily_picks::acted.eq(true))
    .execute(&mut conn)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactions & metrics
// ---------------------------------------------------------------------------

pub fn insert_interaction(pool: &DbPool, interaction: NewUserInteraction) -> AppResult<()> {
    let mut conn = conn(pool)?;
    diesel::insert_into(user_interactions::table)
        .values(&interaction)
        .execute(&mut conn)?;
    Ok(())
}

pub fn latest_metric(pool: &DbPool, user_id: i64) -> AppResult<Option<AlgorithmMetric>> {
    let mut conn = conn(pool)?;
    let row = algorithm_metrics::table
        .filter(algorithm_metrics::user_id.eq(user_id))
        .order(algorithm_metrics::calculated_at.desc())
        .first::<AlgorithmMetric>(&mut conn)
        .optional()?;
    Ok(row)
}
