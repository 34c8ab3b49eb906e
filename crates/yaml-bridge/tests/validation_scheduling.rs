//! Debounce behavior driven through editor content changes.

mod common;

use common::{ScriptedService, model_uri};
use std::sync::Arc;
use std::time::Duration;
use yaml_bridge::config::ValidationConfig;
use yaml_bridge::editor::DEFAULT_MARKER_OWNER;
use yaml_bridge::{BridgeConfig, Editor, LANGUAGE_ID, YamlSupport, register_yaml_support};
use yaml_bridge_core::LanguageService;

const DEBOUNCE: Duration = Duration::from_millis(200);

fn setup(text: &str) -> (Arc<Editor>, Arc<ScriptedService>, YamlSupport) {
    let editor = Arc::new(Editor::new());
    let service = Arc::new(ScriptedService::default());
    let config = BridgeConfig {
        validation: ValidationConfig {
            debounce_ms: DEBOUNCE.as_millis() as u64,
        },
        ..Default::default()
    };
    let support = register_yaml_support(
        &editor,
        Arc::clone(&service) as Arc<dyn LanguageService>,
        &config,
    );
    editor.create_model(model_uri(), LANGUAGE_ID, text);
    (editor, service, support)
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_validates_final_version_once() {
    let (editor, service, _support) = setup("kind: P");

    let mut last_version = 0;
    for text in ["kind: Po", "kind: Pod", "kind: Pod\nspec: error", "kind: Pod\nspec: {}"] {
        last_version = editor.set_value(&model_uri(), text).unwrap();
        tokio::time::sleep(DEBOUNCE / 4).await;
    }

    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(service.validations(), 1);
    assert_eq!(service.validated_versions(), vec![last_version]);
    assert!(
        editor
            .get_model_markers(&model_uri(), DEFAULT_MARKER_OWNER)
            .is_empty()
    );
}

#[tokio::test(start_paused = true)]
async fn test_quiet_periods_validate_each_edit() {
    let (editor, service, _support) = setup("a: 1");

    editor.set_value(&model_uri(), "a: error").unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(
        editor
            .get_model_markers(&model_uri(), DEFAULT_MARKER_OWNER)
            .len(),
        1
    );

    editor.set_value(&model_uri(), "a: 2").unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert!(
        editor
            .get_model_markers(&model_uri(), DEFAULT_MARKER_OWNER)
            .is_empty()
    );

    assert_eq!(service.validations(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_validates_before_the_quiet_period() {
    let (editor, service, support) = setup("a: 1");

    editor.set_value(&model_uri(), "a: error").unwrap();
    tokio::time::sleep(DEBOUNCE / 2).await;

    assert_eq!(service.validations(), 0);
    assert!(support.scheduler().is_pending(&model_uri()));
}

#[tokio::test(start_paused = true)]
async fn test_clearing_buffer_mid_burst_cancels_validation() {
    let (editor, service, support) = setup("a: error");
    support.scheduler().validate_now(&model_uri()).await.unwrap();

    editor.set_value(&model_uri(), "a: still error").unwrap();
    tokio::time::sleep(DEBOUNCE / 4).await;
    editor.set_value(&model_uri(), "").unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(service.validations(), 1);
    assert!(
        editor
            .get_model_markers(&model_uri(), DEFAULT_MARKER_OWNER)
            .is_empty()
    );
}
