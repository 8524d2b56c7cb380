//! End-to-end pipeline runs against a temporary store

mod helpers;

use helpers::{
    make_question, make_test, open_store, source_question, source_test, FakeParser,
    PrefixTranslator, ScriptedLlm,
};
use qdt_common::{Error, Language};
use qdt_prebuild::doctor::TextSanityDoctor;
use qdt_prebuild::overrides::TextOverrides;
use qdt_prebuild::stages::{
    ComposeMode, ComposeStage, DoctorStage, QuestionCommentService, QuestionCommentStage,
    TranslateStage,
};
use qdt_prebuild::translation::TextTranslator;
use qdt_prebuild::{BootstrapMode, Pipeline, PipelineStep, PrebuildBuilder, PrebuildStore};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn builder(store: PrebuildStore, languages: &[Language]) -> PrebuildBuilder {
    PrebuildBuilder::new(store, languages.to_vec())
}

/// Store holding one test with question "foo" and a single right answer "foo"
async fn foo_builder(languages: &[Language]) -> (TempDir, PrebuildBuilder) {
    let (dir, store) = open_store().await;
    store.add_test(&make_test(1, "Signs")).await.unwrap();
    store
        .add_question(&make_question(1, 1, "foo", &["foo"]))
        .await
        .unwrap();
    (dir, builder(store, languages))
}

async fn set_slot(builder: &PrebuildBuilder, lang: Language, content: &str) {
    let question = builder.store().get_questions().await.unwrap().remove(0);
    let mut text = question.text.clone();
    text.localizations.set_content(lang, content);
    builder.store().update_text(&text).await.unwrap();
}

#[tokio::test]
async fn test_init_composes_missing_questions() {
    let (_dir, store) = open_store().await;
    let builder = builder(store, &[Language::EN]);
    let parser = FakeParser {
        tests: vec![
            source_test(
                "A",
                vec![source_question("a1", &["x"]), source_question("a2", &["x"])],
            ),
            source_test("B", vec![source_question("b1", &["x"])]),
            source_test("C", vec![]),
        ],
    };
    let mut compose = ComposeStage::new(ComposeMode::FixMissed, 2, Some(7));

    let state = builder
        .run_init(&parser, &mut compose, BootstrapMode::Recreate)
        .await
        .unwrap();

    assert_eq!(state.tests.len(), 3);
    assert_eq!(state.questions.len(), 6);
    let ids: HashSet<i64> = state.questions.iter().map(|q| q.question_id).collect();
    assert_eq!(ids.len(), 6);

    for test_id in 1..=3 {
        let questions = builder.store().get_questions_by_test(test_id).await.unwrap();
        assert_eq!(questions.len(), 2);
        let contents: HashSet<&str> = questions
            .iter()
            .filter_map(|q| q.text.canonical_content())
            .collect();
        assert_eq!(contents.len(), 2, "test {} received a duplicate", test_id);
    }
    let b = builder.store().get_questions_by_test(2).await.unwrap();
    assert_eq!(b[0].text.canonical_content(), Some("b1"));
}

#[tokio::test]
async fn test_init_refuses_existing_store_without_recreate() {
    let (_dir, store) = open_store().await;
    let builder = builder(store, &[Language::EN]);
    let parser = FakeParser {
        tests: vec![source_test("A", vec![source_question("a1", &["x"])])],
    };
    let mut compose = ComposeStage::new(ComposeMode::Skip, 15, None);

    let err = builder
        .run_init(&parser, &mut compose, BootstrapMode::Preserve)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invariant(_)));
}

#[tokio::test]
async fn test_override_applies_question_and_answer_contexts() {
    let (dir, builder) = foo_builder(&[Language::ES]).await;
    let mut overrides = TextOverrides::new(dir.path().join("overrides.csv"));
    overrides.put("", Language::EN, "foo", Language::ES, "over-foo");
    overrides.put(
        "question: foo; is_right_answer: True",
        Language::EN,
        "foo",
        Language::ES,
        "over-foo-foo",
    );

    builder.run_override(&overrides).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(question.text.localizations.content(Language::ES), Some("over-foo"));
    assert_eq!(
        question.answers[0].text.localizations.content(Language::ES),
        Some("over-foo-foo")
    );
    assert_eq!(question.text.localizations.content(Language::EN), Some("foo"));
}

#[tokio::test]
async fn test_override_wrong_answer_uses_false_context() {
    let (dir, store) = open_store().await;
    store.add_test(&make_test(1, "Signs")).await.unwrap();
    store
        .add_question(&make_question(1, 1, "foo", &["bar", "foo"]))
        .await
        .unwrap();
    let builder = builder(store, &[Language::ES]);
    let mut overrides = TextOverrides::new(dir.path().join("overrides.csv"));
    overrides.put("", Language::EN, "foo", Language::ES, "over-foo");
    overrides.put(
        "question: foo; is_right_answer: False",
        Language::EN,
        "foo",
        Language::ES,
        "over-foo-foo",
    );

    builder.run_override(&overrides).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(question.text.localizations.content(Language::ES), Some("over-foo"));
    assert!(!question.answers[1].is_right_answer);
    assert_eq!(
        question.answers[1].text.localizations.content(Language::ES),
        Some("over-foo-foo")
    );
    assert_eq!(question.answers[0].text.localizations.content(Language::ES), None);
}

#[tokio::test]
async fn test_dump_into_empty_table_keeps_unchanged_slots() {
    let (dir, builder) = foo_builder(&[Language::ES]).await;
    let path = dir.path().join("overrides.csv");
    let mut applied = TextOverrides::new(&path);
    applied.put("", Language::EN, "foo", Language::ES, "foo");
    builder.run_override(&applied).await.unwrap();

    let mut dumped = TextOverrides::new(dir.path().join("dumped.csv"));
    builder.run_dump_overrides(&mut dumped).await.unwrap();

    assert_eq!(dumped.len(), 1);
    assert_eq!(dumped.get("", Language::EN, "foo", Language::ES), Some("foo"));
}

#[tokio::test]
async fn test_dump_then_override_restores_edits() {
    let (dir, builder) = foo_builder(&[Language::FR]).await;
    set_slot(&builder, Language::FR, "fr-foo").await;

    let path = dir.path().join("overrides.csv");
    let mut overrides = TextOverrides::load(&path).unwrap();
    builder.run_dump_overrides(&mut overrides).await.unwrap();
    assert!(path.exists());

    // Losing the edit and re-applying the table brings it back
    set_slot(&builder, Language::FR, "").await;
    let reloaded = TextOverrides::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    builder.run_override(&reloaded).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(question.text.localizations.content(Language::FR), Some("fr-foo"));

    // Dumping again changes nothing
    let mut again = TextOverrides::load(&path).unwrap();
    builder.run_dump_overrides(&mut again).await.unwrap();
    assert_eq!(TextOverrides::load(&path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_translate_fills_only_gaps() {
    let (_dir, builder) = foo_builder(&[Language::EN, Language::ES, Language::FR]).await;
    set_slot(&builder, Language::FR, "manual-foo").await;

    let translator = Arc::new(PrefixTranslator::default());
    let mut stage = TranslateStage::new(TextTranslator::new(
        translator.clone(),
        builder.languages().to_vec(),
    ));
    builder.run_translate(&mut stage).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(question.text.localizations.content(Language::ES), Some("es-foo"));
    assert_eq!(question.text.localizations.content(Language::FR), Some("manual-foo"));
    assert_eq!(
        question.answers[0].text.localizations.content(Language::FR),
        Some("fr-foo")
    );
    let title = &builder.store().get_tests().await.unwrap()[0].title;
    assert_eq!(title.localizations.content(Language::ES), Some("Signs"));

    // Everything is filled now; a second run asks for nothing
    let calls = translator.calls();
    builder.run_translate(&mut stage).await.unwrap();
    assert_eq!(translator.calls(), calls);
}

#[tokio::test]
async fn test_doctor_persists_and_resolves_sanity_warnings() {
    let (_dir, builder) = foo_builder(&[Language::ES]).await;
    set_slot(&builder, Language::ES, "es-`foo").await;
    let mut doctor = DoctorStage::new(2).with_doctor(TextSanityDoctor::new());

    builder.run_doctor(&mut doctor).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    let es_id = question
        .text
        .localizations
        .get(Language::ES)
        .unwrap()
        .localization_id
        .unwrap();
    let warnings = builder.store().get_all_text_warnings().await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, "SFS");
    assert_eq!(warnings[0].content, "Forbidden symbol: `");
    assert_eq!(warnings[0].text_localization_id, es_id);
    assert_eq!(warnings[0].text_id, question.text.text_id.unwrap());

    // Re-running keeps a single warning per slot and code
    builder.run_doctor(&mut doctor).await.unwrap();
    assert_eq!(builder.store().get_all_text_warnings().await.unwrap().len(), 1);

    set_slot(&builder, Language::ES, "es-foo").await;
    builder.run_doctor(&mut doctor).await.unwrap();
    assert!(builder.store().get_all_text_warnings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_doctor_reports_broken_numbers() {
    let (_dir, store) = open_store().await;
    store.add_test(&make_test(1, "Signs")).await.unwrap();
    store
        .add_question(&make_question(1, 1, "foo 1 boo 2", &["ok"]))
        .await
        .unwrap();
    let builder = builder(store, &[Language::ES]);
    set_slot(&builder, Language::ES, "es-foo 1 es-boo err").await;

    let mut doctor = DoctorStage::new(4).with_doctor(TextSanityDoctor::new());
    builder.run_doctor(&mut doctor).await.unwrap();

    let warnings = builder.store().get_all_text_warnings().await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, "SBN");
    assert_eq!(
        warnings[0].content,
        "Numbers in EN: [1, 2], aren't the same as in the translation: [1]"
    );
}

#[tokio::test]
async fn test_question_comment_is_generated_once() {
    let (_dir, builder) = foo_builder(&[Language::EN]).await;
    let llm = Arc::new(ScriptedLlm::new(" \"Because it says foo. 💡 Think foo.\"\n"));
    let mut stage = QuestionCommentStage::new(QuestionCommentService::new(
        llm.clone(),
        "driving theory test",
        None,
    ));

    builder.run_question_comment(&mut stage).await.unwrap();
    builder.run_question_comment(&mut stage).await.unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    let comment = question.comment_text.unwrap();
    assert_eq!(comment.canonical_content(), Some("Because it says foo. 💡 Think foo."));
    assert!(comment.text_id.is_some());
    assert_eq!(llm.prompt_count(), 1);
}

#[tokio::test]
async fn test_question_comment_needs_one_right_answer() {
    let (_dir, store) = open_store().await;
    store.add_test(&make_test(1, "Signs")).await.unwrap();
    let mut question = make_question(1, 1, "Pick two", &["a", "b"]);
    question.answers[1].is_right_answer = true;
    store.add_question(&question).await.unwrap();
    let builder = builder(store, &[Language::EN]);

    let llm = Arc::new(ScriptedLlm::new("Never used"));
    let mut stage = QuestionCommentStage::new(QuestionCommentService::new(
        llm.clone(),
        "driving theory test",
        None,
    ));
    let err = builder.run_question_comment(&mut stage).await.unwrap_err();

    match err {
        Error::Stage { stage, source, .. } => {
            assert_eq!(stage, "question_comment");
            assert!(matches!(*source, Error::Invariant(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(llm.prompt_count(), 0);
    let stored = builder.store().get_questions().await.unwrap().remove(0);
    assert!(stored.comment_text.is_none());
}

#[tokio::test]
async fn test_run_from_translate_covers_comments() {
    let (dir, builder) = foo_builder(&[Language::EN, Language::ES]).await;
    let translator = Arc::new(PrefixTranslator::default());
    let mut pipeline = Pipeline {
        overrides: TextOverrides::new(dir.path().join("overrides.csv")),
        translate: TranslateStage::new(TextTranslator::new(
            translator,
            builder.languages().to_vec(),
        )),
        comment: QuestionCommentStage::new(QuestionCommentService::new(
            Arc::new(ScriptedLlm::new("Because.")),
            "driving theory test",
            None,
        )),
        doctor: DoctorStage::new(2).with_doctor(TextSanityDoctor::new()),
    };

    builder
        .run_from(PipelineStep::Translate, &mut pipeline)
        .await
        .unwrap();

    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(question.text.localizations.content(Language::ES), Some("es-foo"));
    // Comments are generated after translation, so their slots wait for the next run
    let comment = question.comment_text.unwrap();
    assert_eq!(comment.canonical_content(), Some("Because."));
    assert!(comment.localizations.content(Language::ES).is_none());

    builder
        .run_from(PipelineStep::Translate, &mut pipeline)
        .await
        .unwrap();
    let question = builder.store().get_questions().await.unwrap().remove(0);
    assert_eq!(
        question.comment_text.unwrap().localizations.content(Language::ES),
        Some("es-Because.")
    );
    assert!(builder.store().get_all_text_warnings().await.unwrap().is_empty());
}
