use async_trait::async_trait;
use llm_kbc_probe::disambiguation::{
    DispatchTable, LlmArbiter, Orchestrator, Outcome, ResolveContext, Resolution, Strategy,
};
use llm_kbc_probe::error::LlmError;
use llm_kbc_probe::llm::{ChatModel, ChatRequest, RetryPolicy};
use llm_kbc_probe::search::{CandidateEntity, EntitySearch};
use llm_kbc_probe::store::{read_records, write_records};
use llm_kbc_probe::{Record, Relation};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Search backed by a fixed query → candidates map; counts calls.
#[derive(Debug, Default)]
struct FakeSearch {
    index: HashMap<String, Vec<CandidateEntity>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    fn with(mut self, query: &str, candidates: &[(&str, &str, Option<&str>)]) -> Self {
        self.index.insert(
            query.to_string(),
            candidates
                .iter()
                .map(|(id, label, desc)| CandidateEntity::new(*id, *label, *desc))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl EntitySearch for FakeSearch {
    async fn search(&self, query: &str) -> Vec<CandidateEntity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.index.get(query).cloned().unwrap_or_default()
    }
}

/// Search that must never be reached.
#[derive(Debug)]
struct UnreachableSearch;

#[async_trait]
impl EntitySearch for UnreachableSearch {
    async fn search(&self, query: &str) -> Vec<CandidateEntity> {
        panic!("search called for {query}");
    }
}

#[derive(Debug)]
struct ScriptedChat {
    reply: Result<String, fn() -> LlmError>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}

fn ctx<'a>(
    search: &'a dyn EntitySearch,
    arbiter: Option<&'a LlmArbiter>,
    subject: &'a str,
) -> ResolveContext<'a> {
    ResolveContext {
        search,
        arbiter,
        subject,
    }
}

fn record(subject: &str, relation: Relation, objects: &[&str]) -> Record {
    Record::new(
        "Q0",
        subject,
        relation.as_str(),
        objects.iter().map(ToString::to_string).collect(),
    )
}

#[tokio::test]
async fn test_case_table_wins_without_search() {
    let resolution = Strategy::CaseBased
        .resolve(
            "mercury",
            Relation::CompoundHasParts,
            &ctx(&UnreachableSearch, None, "cinnabar"),
        )
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Resolved("Q925".into()));
}

#[tokio::test]
async fn test_case_miss_falls_back_to_first_ranked() {
    let search = FakeSearch::default().with(
        "gold",
        &[("Q897", "gold", Some("chemical element")), ("Q2", "Gold", None)],
    );
    let resolution = Strategy::CaseBased
        .resolve("gold", Relation::CompoundHasParts, &ctx(&search, None, "x"))
        .await
        .unwrap();
    assert_eq!(resolution.into_id(), "Q897");
}

#[tokio::test]
async fn test_no_candidates_keeps_item() {
    let search = FakeSearch::default();
    let keywords = DispatchTable::standard()
        .unwrap()
        .get(Relation::BandHasMember)
        .cloned()
        .unwrap();

    for strategy in [Strategy::Baseline, keywords] {
        let resolution = strategy
            .resolve("Nobody Atall", Relation::BandHasMember, &ctx(&search, None, "x"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Unresolved("Nobody Atall".into()));
    }
}

#[tokio::test]
async fn test_keyword_match_beats_rank() {
    let search = FakeSearch::default().with(
        "Paul McCartney",
        &[
            ("Q100", "Paul McCartney", Some("1970 album")),
            ("Q2599", "Paul McCartney", Some("English singer-songwriter")),
            ("Q300", "Paul McCartney", None),
        ],
    );
    let strategy = DispatchTable::standard()
        .unwrap()
        .get(Relation::BandHasMember)
        .cloned()
        .unwrap();

    let resolution = strategy
        .resolve("Paul McCartney", Relation::BandHasMember, &ctx(&search, None, "The Beatles"))
        .await
        .unwrap();
    assert_eq!(resolution.into_id(), "Q2599");
}

#[tokio::test]
async fn test_keyword_without_match_takes_first_ranked() {
    let search = FakeSearch::default().with(
        "Help!",
        &[("Q1", "Help!", Some("song")), ("Q2", "Help!", None)],
    );
    let strategy = DispatchTable::standard()
        .unwrap()
        .get(Relation::BandHasMember)
        .cloned()
        .unwrap();

    let resolution = strategy
        .resolve("Help!", Relation::BandHasMember, &ctx(&search, None, "x"))
        .await
        .unwrap();
    assert_eq!(resolution.into_id(), "Q1");
}

#[tokio::test]
async fn test_autobiography_searches_title_before_colon() {
    let search = FakeSearch::default().with(
        "Dreams from My Father",
        &[("Q1260", "Dreams from My Father", Some("memoir by Barack Obama"))],
    );
    let strategy = DispatchTable::standard()
        .unwrap()
        .get(Relation::PersonHasAutobiography)
        .cloned()
        .unwrap();

    let resolution = strategy
        .resolve(
            "Dreams from My Father: A Story of Race and Inheritance",
            Relation::PersonHasAutobiography,
            &ctx(&search, None, "Barack Obama"),
        )
        .await
        .unwrap();
    assert_eq!(resolution.into_id(), "Q1260");
    assert_eq!(search.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lm_single_candidate_skips_chat() {
    let search = FakeSearch::default().with("Seine", &[("Q1471", "Seine", Some("river"))]);
    let chat = Arc::new(ScriptedChat::replying("Q999"));
    let shared = Arc::clone(&chat) as Arc<dyn ChatModel>;
    let arbiter = LlmArbiter::new(shared, RetryPolicy::default());

    let strategy = Strategy::LmArbitrated {
        question_template: "Which river is {subject_entity} located at?".into(),
    };
    let resolution = strategy
        .resolve("Seine", Relation::PersonHasSpouse, &ctx(&search, Some(&arbiter), "Paris"))
        .await
        .unwrap();

    assert_eq!(resolution.into_id(), "Q1471");
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn test_lm_arbitrates_between_river_candidates() {
    let search = FakeSearch::default()
        .with("Seine", &[("Q5", "Seine", Some("commune in France"))])
        .with("Seine River", &[("Q1471", "Seine", Some("river in France"))])
        .with("River Seine", &[("Q1471", "Seine", Some("river in France"))]);
    let chat = Arc::new(ScriptedChat::replying("Q1471"));
    let shared = Arc::clone(&chat) as Arc<dyn ChatModel>;
    let arbiter = LlmArbiter::new(shared, RetryPolicy::default()).with_model("gpt-4");

    let strategy = DispatchTable::standard()
        .unwrap()
        .get(Relation::CityLocatedAtRiver)
        .cloned()
        .unwrap();
    let resolution = strategy
        .resolve("Seine", Relation::CityLocatedAtRiver, &ctx(&search, Some(&arbiter), "Paris"))
        .await
        .unwrap();

    assert_eq!(resolution.into_id(), "Q1471");
    let requests = chat.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].messages[0].content;
    assert!(prompt.contains("Which river is Paris located at?"));
    // Duplicate ids from the augmented queries are listed once.
    assert_eq!(prompt.matches("\"Q1471\"").count(), 1);
}

#[tokio::test]
async fn test_lm_reply_without_id_takes_first_ranked() {
    let search = FakeSearch::default().with(
        "Kevin Moore",
        &[("Q1", "Kevin Moore", Some("musician")), ("Q2", "Kevin Moore", Some("footballer"))],
    );
    let chat: Arc<dyn ChatModel> = Arc::new(ScriptedChat::replying("I cannot tell."));
    let arbiter = LlmArbiter::new(chat, RetryPolicy::default());

    let strategy = Strategy::LmArbitrated {
        question_template: "What is the name of the spouse of {subject_entity}?".into(),
    };
    let resolution = strategy
        .resolve("Kevin Moore", Relation::PersonHasSpouse, &ctx(&search, Some(&arbiter), "X"))
        .await
        .unwrap();
    assert_eq!(resolution.into_id(), "Q1");
}

#[tokio::test(start_paused = true)]
async fn test_lm_retry_exhaustion_propagates() {
    let search = FakeSearch::default().with(
        "Kevin Moore",
        &[("Q1", "Kevin Moore", Some("musician")), ("Q2", "Kevin Moore", Some("footballer"))],
    );
    let chat = Arc::new(ScriptedChat {
        reply: Err(|| LlmError::RateLimited("slow down".into())),
        requests: Mutex::new(Vec::new()),
    });
    let shared = Arc::clone(&chat) as Arc<dyn ChatModel>;
    let arbiter = LlmArbiter::new(shared, RetryPolicy::default());

    let strategy = Strategy::LmArbitrated {
        question_template: "{subject_entity}".into(),
    };
    let result = strategy
        .resolve("Kevin Moore", Relation::PersonHasSpouse, &ctx(&search, Some(&arbiter), "X"))
        .await;

    assert!(matches!(
        result,
        Err(llm_kbc_probe::Error::Llm(LlmError::RateLimited(_)))
    ));
    assert_eq!(chat.calls(), 10);
}

#[tokio::test]
async fn test_lm_without_arbiter_is_a_config_error() {
    let search = FakeSearch::default().with(
        "Kevin Moore",
        &[("Q1", "Kevin Moore", None), ("Q2", "Kevin Moore", None)],
    );
    let strategy = Strategy::LmArbitrated {
        question_template: "{subject_entity}".into(),
    };
    let result = strategy
        .resolve("Kevin Moore", Relation::PersonHasSpouse, &ctx(&search, None, "X"))
        .await;
    assert!(matches!(result, Err(llm_kbc_probe::Error::Config(_))));
}

#[tokio::test]
async fn test_orchestrator_end_to_end_case_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("PersonHasEmployer.jsonl");
    let mut input = record("Marianne Journalist", Relation::PersonHasEmployer, &["Marianne"]);
    input.object_ids = Some(vec!["stale".into()]);
    write_records(&path, &[input]).unwrap();

    let orchestrator = Orchestrator::new(
        DispatchTable::standard().unwrap(),
        Arc::new(UnreachableSearch),
        None,
    );
    let outcome = orchestrator
        .run(dir.path(), Relation::PersonHasEmployer)
        .await
        .unwrap();

    let Outcome::Completed(summary) = outcome else {
        panic!("expected a completed pass");
    };
    assert_eq!(summary.resolved, 1);
    let back = read_records(&path).unwrap();
    assert_eq!(back[0].ids(), ["Q3291285"]);
}

#[tokio::test]
async fn test_orchestrator_preserves_shape_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CompoundHasParts.jsonl");
    let records = vec![
        record("cinnabar", Relation::CompoundHasParts, &["mercury", "sulfur", "mercury"]),
        record("water", Relation::CompoundHasParts, &[]),
        record("unknown", Relation::CompoundHasParts, &[""]),
    ];
    write_records(&path, &records).unwrap();

    let search = Arc::new(FakeSearch::default().with(
        "sulfur",
        &[("Q682", "sulfur", Some("chemical element"))],
    ));
    let orchestrator = Orchestrator::new(DispatchTable::standard().unwrap(), search, None);

    orchestrator
        .run(dir.path(), Relation::CompoundHasParts)
        .await
        .unwrap();
    let first = fs::read(&path).unwrap();

    let back = read_records(&path).unwrap();
    assert_eq!(back.len(), 3);
    for (before, after) in records.iter().zip(&back) {
        assert_eq!(before.objects, after.objects);
        assert_eq!(after.ids().len(), after.objects.len());
    }
    assert_eq!(back[0].ids(), ["Q925", "Q682", "Q925"]);
    assert_eq!(back[2].ids(), [""]);

    orchestrator
        .run(dir.path(), Relation::CompoundHasParts)
        .await
        .unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
}
