use serde_json::json;

use super::*;

const CARD_RE: &str = r"\b(\d{1,4})\D?(\d{1,4})\D?(\d{1,4})\D?(\d{1,4})\b";

fn compiled(re: &str, groups: Vec<usize>) -> CompiledMask {
    CompiledMask {
        re: Regex::new(re).unwrap(),
        groups,
        replace_word: None,
        max_count: None,
    }
}

fn apply_one(input: &str, mask: &CompiledMask) -> String {
    mask_value(input, mask).unwrap_or_else(|| input.to_string())
}

#[test]
fn all_digits_masked() {
    let mask = compiled(r"\d", vec![0]);
    assert_eq!(apply_one("12.34.5678", &mask), "**.**.****");
}

#[test]
fn no_match_leaves_value_untouched() {
    let mask = compiled(r"\d", vec![0]);
    assert!(mask_value("ab.cd.efgh", &mask).is_none());
}

#[test]
fn only_the_selected_group_is_masked() {
    let mask = compiled(r"a(x*)b", vec![1]);
    assert_eq!(apply_one("-ab-axxb-", &mask), "-ab-a**b-");

    let whole = compiled(r"a(x*)b", vec![0]);
    assert_eq!(apply_one("-ab-axxb-", &whole), "-**-****-");
}

#[test]
fn card_number_is_masked_group_by_group() {
    let mask = compiled(CARD_RE, vec![1, 2, 3, 4]);
    assert_eq!(
        apply_one("5408-7430-0756-2004", &mask),
        "****-****-****-****"
    );

    let partial = compiled(CARD_RE, vec![1, 2, 3]);
    assert_eq!(
        apply_one("5568-2587-2420-0263", &partial),
        "****-****-****-0263"
    );
}

#[test]
fn two_matches_in_one_value() {
    let mask = compiled(CARD_RE, vec![1, 2, 3, 4]);
    assert_eq!(
        apply_one(
            "issued card number 3528-3889-3793-9946 and card number 4035-3005-3980-4083",
            &mask
        ),
        "issued card number ****-****-****-**** and card number ****-****-****-****"
    );
}

#[test]
fn multibyte_text_masks_per_character() {
    let id_re = r"[А-Я][а-я]{1,64}\s+[А-Я][а-я]{1,64}\s+[А-Я][а-я]{1,64}";
    let mask = compiled(id_re, vec![0]);
    assert_eq!(
        apply_one("user details: Иванов Иван Иванович", &mask),
        "user details: ********************"
    );
}

#[test]
fn max_count_caps_the_asterisks() {
    let mut mask = compiled(r"\d+", vec![0]);
    mask.max_count = Some(4);
    assert_eq!(apply_one("id 1234567890", &mask), "id ****");
}

#[test]
fn replace_word_substitutes_the_group() {
    let mut mask = compiled(r"\d+", vec![0]);
    mask.replace_word = Some("<num>".to_string());
    assert_eq!(apply_one("id 1234567890", &mask), "id <num>");
}

#[test]
fn action_masks_the_whole_tree() {
    let mut action = MaskAction::default();
    action
        .start(
            &json!({"masks": [{"re": CARD_RE, "groups": [1, 2, 3, 4]}]}),
            &ActionParams {
                pipeline: "test".into(),
                index: 0,
            },
        )
        .unwrap();

    let pool = sluice_event::EventPool::new(1);
    let mut event = pool.try_acquire().unwrap();
    event.set_root(json!({
        "field1": "5408-7430-0756-2004",
        "nested": {"card": "5568-2587-2420-0263"},
        "list": ["4035-3005-3980-4083"],
        "n": 42
    }));

    let result = action.apply(event);
    let ActionResult::Pass(event) = result else {
        panic!("mask must pass events through");
    };
    assert_eq!(event.root()["field1"], json!("****-****-****-****"));
    assert_eq!(event.root()["nested"]["card"], json!("****-****-****-****"));
    assert_eq!(event.root()["list"][0], json!("****-****-****-****"));
    assert_eq!(event.root()["n"], json!(42));
}

#[test]
fn bad_config_is_rejected() {
    let mut action = MaskAction::default();
    let params = ActionParams {
        pipeline: "test".into(),
        index: 0,
    };

    assert!(action.start(&json!({}), &params).is_err());
    assert!(action.start(&json!({"masks": []}), &params).is_err());
    assert!(action
        .start(&json!({"masks": [{"re": "(", "groups": [0]}]}), &params)
        .is_err());
    assert!(action
        .start(&json!({"masks": [{"re": "x", "groups": [3]}]}), &params)
        .is_err());
}
