use vision_core::filter::filter;
use vision_core::interfaces::Proposal;
use vision_core::labels::{AllowedLabels, LabelVocabulary};

fn proposals() -> Vec<Proposal> {
    vec![
        Proposal::new([0.0, 0.0, 10.0, 10.0], 1, 0.9),
        Proposal::new([5.0, 5.0, 20.0, 20.0], 2, 0.75),
        Proposal::new([1.0, 1.0, 3.0, 3.0], 1, 0.3),
        Proposal::new([2.0, 2.0, 8.0, 9.0], 7, 0.5),
        Proposal::new([2.0, 2.0, 8.0, 9.0], 1, 0.49999),
    ]
}

#[test]
fn every_survivor_meets_threshold() {
    let vocab = LabelVocabulary::new([(1, "gun")]);
    for t in [0.0, 0.3, 0.5, 0.75, 0.9, 1.0] {
        let out = filter(&proposals(), t, &AllowedLabels::All, &vocab);
        assert!(out.iter().all(|d| d.score() >= t));
        let expected = proposals().iter().filter(|p| p.score >= t).count();
        assert_eq!(out.len(), expected, "threshold {t}");
    }
}

#[test]
fn preserves_order_and_synthesizes_unknown_names() {
    let vocab = LabelVocabulary::new([(1, "gun")]);
    let out = filter(&proposals(), 0.5, &AllowedLabels::All, &vocab);
    let names: Vec<_> = out.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(names, vec!["gun", "class_2", "class_7"]);
}

#[test]
fn allowlist_excludes_other_labels() {
    let vocab = LabelVocabulary::new([(1, "gun")]);
    let out = filter(&proposals(), 0.0, &AllowedLabels::only([1]), &vocab);
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|d| d.proposal.label == 1));
}

#[test]
fn filtering_is_idempotent() {
    let vocab = LabelVocabulary::default();
    let allowed = AllowedLabels::only([1, 2]);
    let once = filter(&proposals(), 0.5, &allowed, &vocab);
    let survivors: Vec<Proposal> = once.iter().map(|d| d.proposal).collect();
    let twice = filter(&survivors, 0.5, &allowed, &vocab);
    assert_eq!(once, twice);
}
