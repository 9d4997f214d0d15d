use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use topic_lens::render::NullRenderer;
use topic_lens::{AppSettings, TopicService};

const OCEAN: [&str; 10] = [
    "the ocean waves crash on the sandy beach",
    "sailors sail the ocean on a ship",
    "fish swim in the deep ocean water",
    "the ship sails across ocean waves",
    "beach sand and ocean water",
    "whales and fish live in ocean water",
    "the sailors saw waves from the ship",
    "a ship anchored near the beach",
    "deep water fish and whales",
    "waves wash the sand on the beach",
];

const CODE: [&str; 10] = [
    "the compiler checks the rust code",
    "programmers write code in rust",
    "the rust compiler reports type errors",
    "code review finds bugs in the program",
    "a program is compiled by the compiler",
    "programmers fix bugs in rust code",
    "type errors stop the program compiling",
    "the compiler optimizes program code",
    "rust programmers review code for bugs",
    "the program has type errors and bugs",
];

const GARDEN: [&str; 10] = [
    "the garden flowers bloom in spring",
    "plant the seeds in rich soil",
    "water the garden plants every morning",
    "roses and tulips bloom in the garden",
    "the soil needs compost for the plants",
    "seeds sprout into green plants",
    "spring flowers fill the garden beds",
    "gardeners water the roses and tulips",
    "compost makes the garden soil rich",
    "green plants grow from small seeds",
];

fn csv_payload(texts: &[&str]) -> String {
    let mut csv = String::from("id,text\n");
    for (i, text) in texts.iter().enumerate() {
        csv.push_str(&format!("{},\"{}\"\n", i, text));
    }
    STANDARD.encode(csv)
}

fn two_subjects() -> Vec<&'static str> {
    OCEAN.iter().chain(CODE.iter()).copied().collect()
}

fn three_subjects() -> Vec<&'static str> {
    OCEAN.iter().chain(CODE.iter()).chain(GARDEN.iter()).copied().collect()
}

fn service() -> TopicService {
    TopicService::new(AppSettings::default()).with_renderer(NullRenderer)
}

fn call(service: &TopicService, body: Value) -> (u16, Value) {
    service.handle_json(&body.to_string())
}

fn topics(value: &Value) -> Vec<Vec<String>> {
    value["topics"]
        .as_array()
        .expect("topics array")
        .iter()
        .map(|t| t.as_str().unwrap().split(", ").map(str::to_string).collect())
        .collect()
}

#[test]
fn two_subject_corpus_separates_into_two_topics() {
    let ocean_words = [
        "ocean", "waves", "crash", "sandy", "beach", "sailors", "sail", "ship", "fish", "swim", "deep", "water",
        "sails", "across", "sand", "whales", "live", "saw", "anchored", "near", "wash",
    ];
    let (status, value) = call(
        &service(),
        json!({
            "method": "probabilistic",
            "data": csv_payload(&two_subjects()),
            "column": "text",
            "numTopics": 2,
            "wordsPerTopic": 3,
            "stopwords": true,
            "randomState": 7
        }),
    );
    assert_eq!(status, 200, "{}", value);
    assert_eq!(value["message"], "LDA topic modeling completed.");

    let topics = topics(&value);
    assert_eq!(topics.len(), 2);
    let mut ocean_topics = 0;
    for words in &topics {
        assert_eq!(words.len(), 3);
        let mut unique = words.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        if words.iter().filter(|w| ocean_words.contains(&w.as_str())).count() >= 2 {
            ocean_topics += 1;
        }
    }
    assert_eq!(ocean_topics, 1, "{:?}", topics);
}

#[test]
fn more_topics_than_documents_is_a_fit_error() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "lda",
            "base64": csv_payload(&two_subjects()),
            "column": "text",
            "numTopics": 25
        }),
    );
    assert_eq!(status, 500);
    assert!(value["error"].as_str().unwrap().contains("numTopics"));
    assert!(value.get("topics").is_none());
}

#[test]
fn sweep_over_thirty_documents_scores_every_candidate() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "probabilistic",
            "data": csv_payload(&three_subjects()),
            "column": "text",
            "numTopics": 3,
            "wordsPerTopic": 4,
            "stopwords": true,
            "coherence_analysis": true,
            "min_topics": 2,
            "max_topics": 4,
            "step": 1
        }),
    );
    assert_eq!(status, 200, "{}", value);
    assert_eq!(value["message"], "LDA topic modeling completed with coherence analysis.");

    let analysis = &value["coherence_analysis"];
    assert_eq!(analysis["topics_range"], json!([2, 3, 4]));
    let scores: Vec<f64> = analysis["coherence_scores"].as_array().unwrap().iter().map(|s| s.as_f64().unwrap()).collect();
    assert_eq!(scores.len(), 3);

    let best_topic = analysis["best_topic"].as_u64().unwrap();
    let best_coherence = analysis["best_coherence"].as_f64().unwrap();
    assert!((2..=4).contains(&best_topic));
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(best_coherence, max);
    assert_eq!(scores[(best_topic - 2) as usize], best_coherence);
    assert_eq!(scores.iter().position(|&s| s == max), Some((best_topic - 2) as usize));

    let perplexity = value["perplexity_analysis"]["perplexity_scores"].as_array().unwrap();
    assert_eq!(perplexity.len(), 3);
    assert!(value.get("sse_analysis").is_none());
}

#[test]
fn factorization_sweep_reports_sse() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "factorization-lsa",
            "data": csv_payload(&three_subjects()),
            "column": "text",
            "numTopics": 3,
            "stopwords": true,
            "coherence_analysis": true,
            "min_topics": 2,
            "max_topics": 6,
            "step": 2
        }),
    );
    assert_eq!(status, 200, "{}", value);
    assert_eq!(value["coherence_analysis"]["topics_range"], json!([2, 4, 6]));
    assert_eq!(value["sse_analysis"]["sse_scores"].as_array().unwrap().len(), 3);
    assert!(value.get("perplexity_analysis").is_none());
}

#[test]
fn sweep_past_the_corpus_size_is_a_fit_error() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "nmf",
            "data": csv_payload(&OCEAN[..6]),
            "column": "text",
            "numTopics": 2,
            "stopwords": true,
            "coherence_analysis": true,
            "min_topics": 2,
            "max_topics": 1_000_000_000_000_000i64,
            "step": 1
        }),
    );
    assert_eq!(status, 500, "{}", value);
    assert!(value["error"].as_str().unwrap().contains("numTopics"));
    assert!(value.get("coherence_analysis").is_none());
}

#[test]
fn fixed_seed_reproduces_topics() {
    let svc = service();
    for method in ["probabilistic", "factorization-nmf", "factorization-lsa"] {
        let body = json!({
            "method": method,
            "data": csv_payload(&three_subjects()),
            "column": "text",
            "numTopics": 3,
            "stopwords": true,
            "randomState": 11
        });
        let (_, first) = call(&svc, body.clone());
        let (_, second) = call(&svc, body);
        assert_eq!(first["topics"], second["topics"], "{}", method);
        assert_eq!(first["topics"].as_array().unwrap().len(), 3, "{}", method);
    }
}

#[test]
fn omitted_seed_defaults_to_42() {
    let svc = service();
    let base = json!({
        "method": "nmf",
        "data": csv_payload(&three_subjects()),
        "column": "text",
        "numTopics": 3,
        "stopwords": true
    });
    let mut seeded = base.clone();
    seeded["randomState"] = json!(42);
    let (_, implicit) = call(&svc, base);
    let (_, explicit) = call(&svc, seeded);
    assert_eq!(implicit["topics"], explicit["topics"]);
}

#[test]
fn missing_column_is_a_client_error() {
    let (status, value) = call(
        &service(),
        json!({ "data": csv_payload(&two_subjects()), "column": "body" }),
    );
    assert_eq!(status, 400);
    assert_eq!(value["error"], "Column 'body' not found in dataset.");
    assert_eq!(value["field"], "column");
}

#[test]
fn unsupported_method_is_a_client_error() {
    let (status, value) = call(
        &service(),
        json!({ "method": "kmeans", "data": csv_payload(&two_subjects()), "column": "text" }),
    );
    assert_eq!(status, 400);
    assert_eq!(value["field"], "method");
}

#[test]
fn all_stopword_corpus_has_an_empty_vocabulary() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "lda",
            "data": csv_payload(&["the and of", "a an the", "is it so"]),
            "column": "text",
            "numTopics": 1,
            "stopwords": true
        }),
    );
    assert_eq!(status, 400, "{}", value);
}

#[test]
fn embedding_cluster_never_exceeds_requested_topics() {
    let svc = service();
    for k in [1, 2, 3, 5] {
        let (status, value) = call(
            &svc,
            json!({
                "method": "embedding-cluster",
                "data": csv_payload(&three_subjects()),
                "column": "text",
                "numTopics": k,
                "stopwords": true,
                "embeddingModel": "hashing",
                "coherence_analysis": true
            }),
        );
        assert_eq!(status, 200, "{}", value);
        assert_eq!(value["message"], "BERTOPIC topic modeling completed.");
        let topics = value["topics"].as_array().unwrap();
        assert!(!topics.is_empty());
        assert!(topics.len() <= k, "k={} got {}", k, topics.len());
        assert!(value.get("coherence_analysis").is_none());
    }
    assert_eq!(svc.registry().loaded_models(), vec!["hashing".to_string()]);
}

#[cfg(not(feature = "bert"))]
#[test]
fn embedding_cluster_without_a_model_name_uses_feature_hashing() {
    let svc = service();
    let (status, value) = call(
        &svc,
        json!({
            "method": "embedding-cluster",
            "data": csv_payload(&three_subjects()),
            "column": "text",
            "numTopics": 3,
            "stopwords": true
        }),
    );
    assert_eq!(status, 200, "{}", value);
    assert_eq!(svc.registry().loaded_models(), vec!["hashing".to_string()]);
}

#[test]
fn unavailable_embedding_model_is_reported() {
    let (status, value) = call(
        &service(),
        json!({
            "method": "bertopic",
            "data": csv_payload(&three_subjects()),
            "column": "text",
            "embeddingModel": "no-such-model"
        }),
    );
    assert_eq!(status, 400);
    assert_eq!(value["field"], "embeddingModel");
}
