//! Composition of the movies, persons and genres pipelines.

use std::time::Duration;

use etl_pipeline::{
    Aggregate, BulkLoader, ElasticsearchLoader, Entity, FilmTransformer, GenreTransformer,
    LoadError, PersonTransformer, Pipeline, RetryPolicy, Selection, SyncPipeline, WorkerSpec,
};
use etl_types::Settings;

fn loader(settings: &Settings, index: &str, retry: &RetryPolicy) -> Result<Box<dyn BulkLoader>, LoadError> {
    let loader = ElasticsearchLoader::new(
        settings.destination.url.clone(),
        index,
        settings.destination.batch_size,
        Duration::from_secs(settings.destination.timeout_secs),
        retry.clone(),
    )?;
    Ok(Box::new(loader))
}

/// Every pipeline in the order a cycle runs them.
pub fn build_pipelines(
    settings: &Settings,
    retry: &RetryPolicy,
) -> Result<Vec<Box<dyn SyncPipeline>>, LoadError> {
    let streams = &settings.streams;
    let page_size = settings.source.batch_size;

    let movies = Pipeline::new(
        "movies",
        Aggregate::FilmWork,
        FilmTransformer,
        loader(settings, &settings.indexes.movies, retry)?,
        page_size,
    )
    .with_worker(WorkerSpec::related(
        streams.film_work_person.clone(),
        Selection::Related(Entity::Person),
    ))
    .with_worker(WorkerSpec::related(
        streams.film_work_genre.clone(),
        Selection::Related(Entity::Genre),
    ))
    .with_worker(WorkerSpec::related(
        streams.film_work_mark.clone(),
        Selection::Related(Entity::Mark),
    ))
    .with_worker(WorkerSpec::root(
        streams.film_work.clone(),
        Selection::Root(Entity::FilmWork),
    ));

    let persons = Pipeline::new(
        "persons",
        Aggregate::Person,
        PersonTransformer,
        loader(settings, &settings.indexes.persons, retry)?,
        page_size,
    )
    .with_worker(WorkerSpec::root(
        streams.person.clone(),
        Selection::Root(Entity::Person),
    ));

    let genres = Pipeline::new(
        "genres",
        Aggregate::Genre,
        GenreTransformer,
        loader(settings, &settings.indexes.genres, retry)?,
        page_size,
    )
    .with_worker(WorkerSpec::root(
        streams.genre.clone(),
        Selection::Root(Entity::Genre),
    ));

    let pipelines: Vec<Box<dyn SyncPipeline>> =
        vec![Box::new(movies), Box::new(persons), Box::new(genres)];
    Ok(pipelines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_pipelines_in_order() {
        let pipelines = build_pipelines(&Settings::default(), &RetryPolicy::default()).unwrap();
        let names: Vec<&str> = pipelines.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["movies", "persons", "genres"]);
    }

    #[test]
    fn test_movies_related_streams_run_first() {
        let pipelines = build_pipelines(&Settings::default(), &RetryPolicy::default()).unwrap();
        assert_eq!(
            pipelines[0].streams(),
            vec!["film_work.person", "film_work.genre", "film_work.mark", "film_work"]
        );
        assert_eq!(pipelines[1].streams(), vec!["person"]);
        assert_eq!(pipelines[2].streams(), vec!["genre"]);
    }

    #[test]
    fn test_stream_names_follow_settings() {
        let mut settings = Settings::default();
        settings.streams.genre = "genres_v2".to_string();
        let pipelines = build_pipelines(&settings, &RetryPolicy::default()).unwrap();
        assert_eq!(pipelines[2].streams(), vec!["genres_v2"]);
    }
}
