//! End-to-end tests: model reply → graph → infilled graph.

use graphcheck::graph::{self, Graph};
use graphcheck::infill::{InfillEngine, InfillError};
use graphcheck::llm::LlmProvider;
use graphcheck::llm::providers::scripted::ScriptedProvider;
use graphcheck::pipeline::{ClaimOutcome, ClaimRequest, Pipeline, run_batch};
use graphcheck::prompt::Prompts;
use graphcheck::retrieval::{Retriever, StaticRetriever};
use tokio_util::sync::CancellationToken;

const GERAGOS_CLAIM: &str = "Mark Geragos was involved in the scandal that took place in the 1990s.";
const GERAGOS_REPLY: &str = "# Latent Entities:\n\
    (ENT1) [SEP] is [SEP] a scandal\n\
    # Triples:\n\
    Mark Geragos [SEP] was involved in [SEP] (ENT1)\n\
    (ENT1) [SEP] took place in [SEP] the 1990s";
const GERAGOS_EVIDENCE: &str = "The Geragos scandal was a 1990s legal dispute.";

const NICK_JR_REPLY: &str = "# Latent Entities:\n\
    (ENT1) [SEP] is [SEP] a television channel\n\
    (ENT2) [SEP] is [SEP] a network\n\
    # Triples:\n\
    Skatoony [SEP] was shown on [SEP] (ENT1)\n\
    (ENT1) [SEP] is owned by [SEP] (ENT2)\n\
    (ENT2) [SEP] launched on [SEP] 24 April 2006";

#[tokio::test]
async fn geragos_scenario() {
    let graph = graph::construct(GERAGOS_REPLY);
    assert_eq!(graph.definition_triples().len(), 1);
    assert_eq!(graph.triples().len(), 2);
    assert!(graph.triples().iter().all(|t| t.raw_text().contains("(ENT1)")));

    let engine = InfillEngine::new(
        LlmProvider::scripted(["the Geragos legal dispute"]),
        Retriever::fixed([GERAGOS_EVIDENCE]),
        Prompts::default(),
    );
    let outcome = engine.run(GERAGOS_CLAIM, graph, vec!["(ENT1)".into()]).await.unwrap();

    assert!(outcome.graph.definition_triples().is_empty());
    assert_eq!(outcome.graph.triples().len(), 2);
    for triple in outcome.graph.triples() {
        assert!(triple.sentence().contains("the Geragos legal dispute"));
        assert!(!triple.sentence().contains("(ENT1)"));
    }
    assert_eq!(outcome.log.len(), 1);
    assert_eq!(outcome.log[0].index, 0);
    assert_eq!(outcome.log[0].answer, "the Geragos legal dispute");
}

#[tokio::test]
async fn geragos_through_the_pipeline() {
    let provider = ScriptedProvider::new([GERAGOS_REPLY, "the Geragos legal dispute"]);
    let pipeline = Pipeline::new(
        LlmProvider::Scripted(provider.clone()),
        Retriever::fixed([GERAGOS_EVIDENCE]),
        Prompts::default(),
        10,
    );
    let report = pipeline.check_claim(ClaimRequest::new(GERAGOS_CLAIM)).await.unwrap();

    assert_eq!(report.path, vec!["(ENT1)"]);
    assert!(report.infilled.is_grounded());
    assert!(provider.prompts()[0].ends_with(GERAGOS_CLAIM));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["infilled"]["definition_triples"].as_array().map(Vec::len), Some(0));
    assert_eq!(
        json["infilled"]["triples"][0]["sentence"],
        "Mark Geragos was involved in the Geragos legal dispute"
    );
}

#[tokio::test]
async fn two_hop_resolution_uses_earlier_answers() {
    let retriever = StaticRetriever::new(["Skatoony aired on Nick Jr. Too, owned by Nickelodeon UK."]);
    let provider = ScriptedProvider::new(["Nick Jr. Too", "Blank is Nickelodeon UK"]);
    let engine = InfillEngine::new(
        LlmProvider::Scripted(provider.clone()),
        Retriever::Static(retriever.clone()),
        Prompts::default(),
    );

    let graph = graph::construct(NICK_JR_REPLY);
    let outcome = engine.run("c", graph, vec!["(ENT1)".into(), "(ENT2)".into()]).await.unwrap();

    // Second retrieval query already reads the first answer.
    let queries = retriever.queries();
    assert_eq!(queries[0], "Skatoony was shown on a television channel.");
    assert_eq!(queries[1], "Nick Jr. Too is owned by a network. a network launched on 24 April 2006.");

    let sentences: Vec<_> = outcome.graph.triples().iter().map(|t| t.sentence().to_string()).collect();
    assert_eq!(
        sentences,
        vec![
            "Skatoony was shown on Nick Jr. Too",
            "Nick Jr. Too is owned by Nickelodeon UK",
            "Nickelodeon UK launched on 24 April 2006",
        ]
    );
    assert!(outcome.graph.is_grounded());
}

#[tokio::test]
async fn placeholder_ten_survives_resolving_one() {
    let graph = Graph::from_texts(
        ["(ENT1) [SEP] is [SEP] a city", "(ENT10) [SEP] is [SEP] a river"],
        ["(ENT1) [SEP] lies on [SEP] the coast", "(ENT10) [SEP] flows into [SEP] the sea"],
    );
    let engine = InfillEngine::new(LlmProvider::scripted(["Lisbon"]), Retriever::fixed(["p"]), Prompts::default());
    let outcome = engine.run("c", graph, vec!["(ENT1)".into()]).await.unwrap();

    assert_eq!(outcome.graph.triples()[0].sentence(), "Lisbon lies on the coast");
    assert_eq!(outcome.graph.triples()[1].sentence(), "(ENT10) flows into the sea");
    assert_eq!(outcome.graph.definition("(ENT10)"), Some("a river"));
}

#[tokio::test]
async fn generation_failure_is_fatal_for_the_claim_only() {
    let provider = ScriptedProvider::default()
        .with_rule("Tall Birds were formed in Issaquah.", "# Triples:\nTall Birds [SEP] formed in [SEP] Issaquah")
        .with_failure_rule("The percussionist of Tall Birds is Ben Smith.", "HTTP 503");
    let pipeline = Pipeline::new(LlmProvider::Scripted(provider), Retriever::fixed(["p"]), Prompts::default(), 3);

    let outcomes = run_batch(
        pipeline,
        vec![
            ClaimRequest::new("The percussionist of Tall Birds is Ben Smith."),
            ClaimRequest::new("Tall Birds were formed in Issaquah."),
        ],
        2,
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(&outcomes[0], ClaimOutcome::Failed { error, .. } if error.contains("HTTP 503")));
    assert!(matches!(&outcomes[1], ClaimOutcome::Completed(_)));
}

#[tokio::test]
async fn retrieval_failure_surfaces_as_retrieval_error() {
    let engine = InfillEngine::new(
        LlmProvider::scripted(["unused"]),
        Retriever::Static(StaticRetriever::failing("index missing")),
        Prompts::default(),
    );
    let err = engine.run("c", graph::construct(GERAGOS_REPLY), vec!["(ENT1)".into()]).await.unwrap_err();
    assert!(matches!(err, InfillError::Retrieval(_)));
    assert!(err.to_string().contains("index missing"));
}
