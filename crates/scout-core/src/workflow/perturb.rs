//! The retry-perturbation policy, isolated as a pure predicate (spec §9's
//! re-architecture note: "a pure function `(kind, cfg, attempt) -> cfg'`
//! plus an explicit termination flag"). The actual config rewriting lives
//! next to each kind's branch in [`super::Executor::fetch_raw`] /
//! [`super::synthesize_goal`] — this module only answers the termination
//! question, since that's the piece every kind needs and the one most
//! often gotten wrong (retrying a kind that has nothing left to vary).

/// Whether `kind` has a defined perturbation for a failed attempt. `http`
/// and `meta` have none — the Executor abandons retries on the first empty
/// result for those kinds (spec §4.E.6).
pub fn has_perturbation(kind: &str) -> bool {
    !matches!(kind, "http" | "meta")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_meta_have_no_perturbation() {
        assert!(!has_perturbation("http"));
        assert!(!has_perturbation("meta"));
    }

    #[test]
    fn reddit_rss_arxiv_search_all_perturb() {
        for kind in ["reddit", "rss", "arxiv", "search"] {
            assert!(has_perturbation(kind), "{kind} should perturb on retry");
        }
    }
}
