//! Parameterized SQL for the movies schema.
//!
//! Scan queries take the cursor timestamp as `$1` and return
//! `(root_id text, modified timestamptz, id text)`. Related scans also take
//! the root stream's cursor timestamp as `$2`, NULL for no bound. Enrichment queries take
//! the id set as `$1 text[]` and return one `doc jsonb` per aggregate.

use super::{Aggregate, Entity, Selection};

const SCAN_FILM_WORK: &str = "
    SELECT fw.id::text AS root_id,
           fw.modified,
           fw.id::text AS id
    FROM content.film_work fw
    WHERE fw.modified >= $1
    ORDER BY fw.modified, fw.id";

const SCAN_PERSON: &str = "
    SELECT p.id::text AS root_id,
           p.modified,
           p.id::text AS id
    FROM content.person p
    WHERE p.modified >= $1
    ORDER BY p.modified, p.id";

const SCAN_GENRE: &str = "
    SELECT g.id::text AS root_id,
           g.modified,
           g.id::text AS id
    FROM content.genre g
    WHERE g.modified >= $1
    ORDER BY g.modified, g.id";

const SCAN_FILM_WORK_BY_PERSON: &str = "
    SELECT fw.id::text AS root_id,
           p.modified,
           p.id::text AS id
    FROM content.person p
    JOIN content.person_film_work pfw ON pfw.person_id = p.id
    JOIN content.film_work fw ON fw.id = pfw.film_work_id
    WHERE p.modified >= $1
      AND fw.modified < p.modified
      AND ($2::timestamptz IS NULL OR fw.modified <= $2)
    ORDER BY p.modified, p.id, fw.id";

const SCAN_FILM_WORK_BY_GENRE: &str = "
    SELECT fw.id::text AS root_id,
           g.modified,
           g.id::text AS id
    FROM content.genre g
    JOIN content.genre_film_work gfw ON gfw.genre_id = g.id
    JOIN content.film_work fw ON fw.id = gfw.film_work_id
    WHERE g.modified >= $1
      AND fw.modified < g.modified
      AND ($2::timestamptz IS NULL OR fw.modified <= $2)
    ORDER BY g.modified, g.id, fw.id";

const SCAN_FILM_WORK_BY_MARK: &str = "
    SELECT fw.id::text AS root_id,
           m.modified,
           m.id::text AS id
    FROM content.mark m
    JOIN content.mark_film_work mfw ON mfw.mark_id = m.id
    JOIN content.film_work fw ON fw.id = mfw.film_work_id
    WHERE m.modified >= $1
      AND fw.modified < m.modified
      AND ($2::timestamptz IS NULL OR fw.modified <= $2)
    ORDER BY m.modified, m.id, fw.id";

const ENRICH_FILM_WORK: &str = "
    SELECT jsonb_build_object(
               'id', fw.id,
               'title', fw.title,
               'description', fw.description,
               'rating', fw.rating,
               'age_limit', fw.age_limit,
               'type', fw.type,
               'modified', fw.modified,
               'persons', COALESCE(
                   json_agg(DISTINCT jsonb_build_object('role', pfw.role, 'id', p.id, 'name', p.full_name))
                       FILTER (WHERE p.id IS NOT NULL),
                   '[]'),
               'genres', COALESCE(
                   json_agg(DISTINCT jsonb_build_object('id', g.id, 'name', g.name))
                       FILTER (WHERE g.id IS NOT NULL),
                   '[]'),
               'marks', COALESCE(
                   json_agg(DISTINCT jsonb_build_object('id', m.id, 'name', m.name))
                       FILTER (WHERE m.id IS NOT NULL),
                   '[]')
           ) AS doc
    FROM content.film_work fw
    LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
    LEFT JOIN content.person p ON p.id = pfw.person_id
    LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
    LEFT JOIN content.genre g ON g.id = gfw.genre_id
    LEFT JOIN content.mark_film_work mfw ON mfw.film_work_id = fw.id
    LEFT JOIN content.mark m ON m.id = mfw.mark_id
    WHERE fw.id = ANY($1::text[]::uuid[])
    GROUP BY fw.id
    ORDER BY fw.id";

const ENRICH_PERSON: &str = "
    SELECT jsonb_build_object(
               'id', t.id,
               'full_name', t.full_name,
               'modified', t.modified,
               'movies', COALESCE(
                   json_agg(jsonb_build_object('role', t.role, 'movies', t.movies))
                       FILTER (WHERE t.role IS NOT NULL),
                   '[]')
           ) AS doc
    FROM (
        SELECT p.id,
               p.full_name,
               p.modified,
               pfw.role,
               json_agg(jsonb_build_object('id', fw.id, 'title', fw.title)) AS movies
        FROM content.person p
        LEFT JOIN content.person_film_work pfw ON pfw.person_id = p.id
        LEFT JOIN content.film_work fw ON fw.id = pfw.film_work_id
        WHERE p.id = ANY($1::text[]::uuid[])
        GROUP BY p.id, pfw.role
    ) t
    GROUP BY t.id, t.full_name, t.modified
    ORDER BY t.id";

const ENRICH_GENRE: &str = "
    SELECT jsonb_build_object(
               'id', g.id,
               'name', g.name,
               'modified', g.modified
           ) AS doc
    FROM content.genre g
    WHERE g.id = ANY($1::text[]::uuid[])
    ORDER BY g.id";

const PROBE_FILM_WORK: &str =
    "SELECT modified, id::text AS id FROM content.film_work ORDER BY modified DESC, id DESC LIMIT 1";
const PROBE_PERSON: &str =
    "SELECT modified, id::text AS id FROM content.person ORDER BY modified DESC, id DESC LIMIT 1";
const PROBE_GENRE: &str =
    "SELECT modified, id::text AS id FROM content.genre ORDER BY modified DESC, id DESC LIMIT 1";
const PROBE_MARK: &str =
    "SELECT modified, id::text AS id FROM content.mark ORDER BY modified DESC, id DESC LIMIT 1";

/// Scan statement for a selection, or `None` if the schema has no such stream.
pub fn scan(selection: Selection) -> Option<&'static str> {
    match selection {
        Selection::Root(Entity::FilmWork) => Some(SCAN_FILM_WORK),
        Selection::Root(Entity::Person) => Some(SCAN_PERSON),
        Selection::Root(Entity::Genre) => Some(SCAN_GENRE),
        Selection::Root(Entity::Mark) => None,
        Selection::Related(Entity::Person) => Some(SCAN_FILM_WORK_BY_PERSON),
        Selection::Related(Entity::Genre) => Some(SCAN_FILM_WORK_BY_GENRE),
        Selection::Related(Entity::Mark) => Some(SCAN_FILM_WORK_BY_MARK),
        Selection::Related(Entity::FilmWork) => None,
    }
}

pub fn enrich(aggregate: Aggregate) -> &'static str {
    match aggregate {
        Aggregate::FilmWork => ENRICH_FILM_WORK,
        Aggregate::Person => ENRICH_PERSON,
        Aggregate::Genre => ENRICH_GENRE,
    }
}

pub fn probe(entity: Entity) -> &'static str {
    match entity {
        Entity::FilmWork => PROBE_FILM_WORK,
        Entity::Person => PROBE_PERSON,
        Entity::Genre => PROBE_GENRE,
        Entity::Mark => PROBE_MARK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_related_scans_apply_drift_rule() {
        for entity in [Entity::Person, Entity::Genre, Entity::Mark] {
            let sql = scan(Selection::Related(entity)).unwrap();
            assert!(sql.contains("fw.modified <"), "{entity} scan lacks drift rule");
            assert!(sql.contains("fw.modified <= $2"), "{entity} scan lacks root bound");
            assert!(sql.contains(">= $1"));
            assert!(sql.trim_end().ends_with("fw.id"));
        }
    }

    #[test]
    fn test_root_scans_take_one_parameter() {
        for entity in [Entity::FilmWork, Entity::Person, Entity::Genre] {
            let sql = scan(Selection::Root(entity)).unwrap();
            assert!(!sql.contains("$2"), "{entity} root scan binds a root bound");
        }
    }

    #[test]
    fn test_unsupported_selections() {
        assert!(scan(Selection::Root(Entity::Mark)).is_none());
        assert!(scan(Selection::Related(Entity::FilmWork)).is_none());
    }

    #[test]
    fn test_enrich_binds_id_array() {
        for aggregate in [Aggregate::FilmWork, Aggregate::Person, Aggregate::Genre] {
            assert!(enrich(aggregate).contains("ANY($1::text[]::uuid[])"));
            assert!(enrich(aggregate).contains("AS doc"));
        }
    }
}
