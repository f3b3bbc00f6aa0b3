//! Fixture repositories and the shared repository conformance suite.
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! other crates' tests.

use std::sync::Arc;

use tabula_store::{save_data, save_dataset, MapStore};
use tabula_types::{
    ChangeRequest, ContentKey, DataFormat, DatasetRecord, Field, FieldType, FormatConfig, PeerId,
    Profile, QueryLogItem, Schema, Structure,
};

use crate::error::{RepoError, RepoResult};
use crate::mem::MemRepo;
use crate::repo::Repo;
use crate::traits::{Query, SearchParams};

pub const MOVIES_CSV: &str = "movie_title,duration
Avatar ,178
Pirates of the Caribbean: At World's End ,169
Spectre ,148
The Dark Knight Rises ,164
Star Wars: Episode VII - The Force Awakens ,
John Carter ,132
Spider-Man 3 ,156
Tangled ,100
";

pub const CITIES_CSV: &str = "city,pop,avg_age,in_usa
toronto,40000000,55.5,false
new york,8500000,44.4,true
chicago,300000,44.4,true
chatham,35000,65.25,true
raleigh,250000,50.65,true
";

pub const COUNTER_CSV: &str = "count
1
2
3
4
5
";

/// Malformed CSV.
pub const BAD_DATA_FILENAME: &str = "bad_csv_file.csv";
pub const BAD_DATA_FILE: &str = "
asdlkfasd,,
fm as
f;lajsmf
a
's;f a'
sdlfj asdf";

/// CSV whose last line is one column short.
pub const BAD_DATA_FORMAT_FILENAME: &str = "abc.csv";
pub const BAD_DATA_FORMAT_FILE: &str = "
\"colA\",\"colB\",\"colC\",\"colD\"
1,2,3,4
1,2,3";

/// CSV with a repeated column name.
pub const BAD_STRUCTURE_FILENAME: &str = "badStructure.csv";
pub const BAD_STRUCTURE_FILE: &str = "
colA, colB, colB, colC
1,2,3,4
1,2,3,4";

pub const JOBS_BY_AUTOMATION_FILENAME: &str = "jobs_ranked_by_automation_probability.csv";
pub const JOBS_BY_AUTOMATION_FILE: &str = r#"rank,probability_of_automation,soc_code,job_title
702,"0.99","41-9041","Telemarketers"
701,"0.99","23-2093","Title Examiners, Abstractors, and Searchers"
700,"0.99","51-6051","Sewers, Hand"
699,"0.99","15-2091","Mathematical Technicians"
698,"0.99","13-2053","Insurance Underwriters"
697,"0.99","49-9064","Watch Repairers"
696,"0.99","43-5011","Cargo and Freight Agents"
695,"0.99","13-2082","Tax Preparers"
694,"0.99","51-9151","Photographic Process Workers and Processing Machine Operators"
693,"0.99","43-4141","New Accounts Clerks"
692,"0.99","25-4031","Library Technicians"
691,"0.99","43-9021","Data Entry Keyers"
690,"0.98","51-2093","Timing Device Assemblers and Adjusters"
689,"0.98","43-9041","Insurance Claims and Policy Processing Clerks"
688,"0.98","43-4011","Brokerage Clerks"
"#;

/// The jobs fixture with lower-cased titles.
pub const JOBS_BY_AUTOMATION_LOWER_FILENAME: &str =
    "jobs_ranked_by_automation_probabilityVersion2.csv";
pub const JOBS_BY_AUTOMATION_LOWER_FILE: &str = r#"rank,probability_of_automation,soc_code,job_title
702,"0.99","41-9041","telemarketers"
701,"0.99","23-2093","title examiners, abstractors, and searchers"
700,"0.99","51-6051","sewers, hand"
699,"0.99","15-2091","mathematical technicians"
698,"0.99","13-2053","insurance underwriters"
697,"0.99","49-9064","watch repairers"
696,"0.99","43-5011","cargo and freight agents"
695,"0.99","13-2082","tax preparers"
694,"0.99","51-9151","photographic process workers and processing machine operators"
693,"0.99","43-4141","new accounts clerks"
692,"0.99","25-4031","library technicians"
691,"0.99","43-9021","data entry keyers"
690,"0.98","51-2093","timing device assemblers and adjusters"
689,"0.98","43-9041","insurance claims and policy processing clerks"
688,"0.98","43-4011","brokerage clerks"
"#;

/// A second revision of the lower-cased jobs fixture with one row dropped.
pub const JOBS_BY_AUTOMATION_LOWER2_FILENAME: &str =
    "jobs_ranked_by_automation_probabilityVersion3.csv";
pub const JOBS_BY_AUTOMATION_LOWER2_FILE: &str = r#"rank,probability_of_automation,soc_code,job_title
702,"0.99","41-9041","telemarketers"
701,"0.99","23-2093","title examiners, abstractors, and searchers"
700,"0.99","51-6051","sewers, hand"
699,"0.99","15-2091","mathematical technicians"
698,"0.99","13-2053","insurance underwriters"
697,"0.99","49-9064","watch repairers"
696,"0.99","43-5011","cargo and freight agents"
695,"0.99","13-2082","tax preparers"
694,"0.99","51-9151","photographic process workers and processing machine operators"
693,"0.99","43-4141","new accounts clerks"
692,"0.99","25-4031","library technicians"
691,"0.99","43-9021","data entry keyers"
690,"0.98","51-2093","timing device assemblers and adjusters"
689,"0.98","43-9041","insurance claims and policy processing clerks"
"#;

fn csv_structure(fields: &[(&str, FieldType)]) -> Structure {
    Structure {
        format: DataFormat::Csv,
        format_config: Some(FormatConfig {
            header_row: true,
            array_entries: false,
        }),
        schema: Some(Schema {
            fields: fields
                .iter()
                .map(|(name, t)| Field::new(*name, *t))
                .collect(),
        }),
        ..Default::default()
    }
}

fn fixtures() -> Vec<(&'static str, &'static str, &'static str, Structure)> {
    vec![
        (
            "movies",
            "example movie data",
            MOVIES_CSV,
            csv_structure(&[
                ("movie_title", FieldType::String),
                ("duration", FieldType::Integer),
            ]),
        ),
        (
            "cities",
            "example city data",
            CITIES_CSV,
            csv_structure(&[
                ("city", FieldType::String),
                ("pop", FieldType::Integer),
                ("avg_age", FieldType::Float),
                ("in_usa", FieldType::Boolean),
            ]),
        ),
        (
            "counter",
            "example counter data",
            COUNTER_CSV,
            csv_structure(&[("count", FieldType::Integer)]),
        ),
    ]
}

/// Save the `movies`, `cities` and `counter` datasets into `repo` and bind
/// their names, in that order.
pub fn seed_test_repo(repo: &dyn Repo) -> RepoResult<()> {
    let store = repo.store();
    for (name, title, csv, structure) in fixtures() {
        let data = save_data(store.as_ref(), csv.as_bytes(), true)?;
        let ds = DatasetRecord {
            title: title.to_string(),
            data,
            length: csv.len() as u64,
            structure: Some(Structure {
                length: csv.len() as u64,
                ..structure
            }),
            timestamp: Some(chrono::Utc::now()),
            ..Default::default()
        };
        let path = save_dataset(store.as_ref(), &ds, true)?;
        repo.datasets().put_dataset(&path, &ds)?;
        repo.namestore().put_name(name, &path)?;
    }
    Ok(())
}

/// A seeded in-memory repository whose profile username is `test_user`.
pub fn new_test_repo() -> RepoResult<MemRepo> {
    let profile = Profile {
        username: "test_user".into(),
        ..Default::default()
    };
    let repo = MemRepo::new(Arc::new(MapStore::new()), profile);
    seed_test_repo(&repo)?;
    Ok(repo)
}

/// Exercise a fresh, empty repository through the whole [`Repo`] surface.
///
/// Every implementation must pass this suite unchanged.
pub fn run_conformance(repo: &dyn Repo) {
    // empty repo
    assert!(!repo.profile().unwrap().username.is_empty());
    assert_eq!(repo.namestore().name_count().unwrap(), 0);
    assert!(repo.namespace(0, 0).unwrap().is_empty());
    assert!(!repo.has_path(&ContentKey::new("/map/anything")).unwrap());
    assert!(matches!(
        repo.search(&SearchParams::default()),
        Err(RepoError::Unsupported(_))
    ));

    seed_test_repo(repo).unwrap();

    // namestore
    let movies = repo.namestore().get_path("movies").unwrap();
    assert_eq!(
        repo.namestore().get_name(&movies).unwrap().as_deref(),
        Some("movies")
    );
    assert!(matches!(
        repo.namestore().put_name("movies", &ContentKey::new("/map/other")),
        Err(RepoError::NameTaken(_))
    ));
    assert!(repo.namestore().get_path("nope").unwrap_err().is_not_found());
    assert_eq!(repo.namestore().name_count().unwrap(), 3);

    // rebind and rename swap a binding in place
    let ns = repo.namestore();
    let other = ContentKey::new("/map/other/dataset.json");
    ns.rebind("movies", &other).unwrap();
    assert_eq!(ns.get_path("movies").unwrap(), other);
    assert_eq!(ns.name_count().unwrap(), 3);
    ns.rebind("movies", &movies).unwrap();
    assert!(ns.rebind("nope", &other).unwrap_err().is_not_found());

    assert_eq!(ns.rename("movies", "films").unwrap(), movies);
    assert!(ns.get_path("movies").unwrap_err().is_not_found());
    assert_eq!(ns.get_path("films").unwrap(), movies);
    assert!(matches!(
        ns.rename("films", "cities"),
        Err(RepoError::NameTaken(_))
    ));
    assert!(matches!(
        ns.rename("films", "bad name"),
        Err(RepoError::InvalidName { .. })
    ));
    assert!(ns.rename("nope", "fresh").unwrap_err().is_not_found());
    assert_eq!(ns.get_path("films").unwrap(), movies);
    ns.rename("films", "movies").unwrap();
    let order: Vec<_> = ns.names(0, 0).unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(order, vec!["movies", "cities", "counter"]);

    // namespace paging and hydration
    let page = repo.namespace(2, 1).unwrap();
    let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["cities", "counter"]);
    assert!(page.iter().all(|r| r.dataset.is_some()));
    assert_eq!(
        page[0].dataset.as_ref().unwrap().title,
        "example city data"
    );

    // content duplication guard
    let movies_ds = repo.load_dataset(&movies).unwrap();
    assert!(repo.has_path(&movies).unwrap());
    assert!(repo.has_path(&movies.package_root()).unwrap());
    assert!(repo.has_path(&movies_ds.data).unwrap());
    assert!(!repo.has_path(&ContentKey::new("/map/unknown")).unwrap());

    // datasets
    assert_eq!(repo.datasets().get_dataset(&movies).unwrap(), movies_ds);
    assert_eq!(repo.datasets().query(&Query::default()).unwrap().len(), 3);
    assert_eq!(repo.datasets().query(&Query::new(1, 0)).unwrap().len(), 1);
    assert_eq!(
        crate::repo::datasets_query(repo.datasets(), &Query::default())
            .unwrap()
            .len(),
        3
    );

    // cache holds only what is put there
    assert!(repo.cache().get_dataset(&ContentKey::new("/map/remote")).is_err());
    repo.cache()
        .put_dataset(&ContentKey::new("/map/remote"), &movies_ds)
        .unwrap();
    assert_eq!(
        repo.cache()
            .get_dataset(&ContentKey::new("/map/remote"))
            .unwrap()
            .title,
        "example movie data"
    );

    // graph
    let graph = repo.graph().unwrap();
    assert_eq!(
        graph.node(&movies).unwrap().names,
        vec!["movies".to_string()]
    );
    assert!(graph.node(&movies_ds.data).is_some());

    // search
    repo.update_search_index().unwrap();
    let hits = repo
        .search(&SearchParams {
            query: "movie".into(),
            limit: 10,
            offset: 0,
        })
        .unwrap();
    assert_eq!(hits[0].name, "movies");
    assert!(hits[0].dataset.is_some());

    // peers
    let peer = PeerId::new("QmConformancePeer");
    repo.peers().put_peer(&peer, &Profile::default()).unwrap();
    let got = repo.peers().get_peer(&peer).unwrap();
    assert_eq!(got.id, peer);
    assert!(!got.username.is_empty());
    assert_eq!(repo.peers().query_peers(&Query::default()).unwrap().len(), 1);
    repo.peers().delete_peer(&peer).unwrap();
    assert!(repo.peers().get_peer(&peer).unwrap_err().is_not_found());

    // query log
    let item = QueryLogItem {
        query: "select * from movies".into(),
        name: "movies".into(),
        key: ContentKey::new("/map/query"),
        dataset_path: movies.clone(),
        time: None,
    };
    repo.query_log().log_query(&item).unwrap();
    assert_eq!(
        repo.query_log()
            .query_log_item(&item.key)
            .unwrap()
            .dataset_path,
        movies
    );
    assert_eq!(repo.query_log().list_query_logs(10, 0).unwrap().len(), 1);

    // change requests
    let cr = ChangeRequest {
        path: ContentKey::new("/map/proposal"),
        target: movies.clone(),
        title: "trim titles".into(),
        ..Default::default()
    };
    repo.change_requests()
        .put_change_request(&cr.path, &cr)
        .unwrap();
    assert_eq!(
        repo.change_requests().get_change_request(&cr.path).unwrap(),
        cr
    );
    repo.change_requests()
        .delete_change_request(&cr.path)
        .unwrap();
    assert!(repo.change_requests().list_change_requests(0, 0).unwrap().is_empty());

    // analytics
    assert_eq!(repo.analytics().increment("dataset_views").unwrap(), 1);
    assert_eq!(repo.analytics().count("dataset_views").unwrap(), 1);

    // delete
    repo.namestore().delete_name("counter").unwrap();
    assert!(repo.namestore().delete_name("counter").unwrap_err().is_not_found());
    assert_eq!(repo.namestore().name_count().unwrap(), 2);
}
