use replies_stage::types::StagedFragment;

/// Deterministically merges a drained batch of staged fragments into a
/// single turn body: sorted by `received_at` (ties broken by `message_sid`
/// lexicographically), non-empty bodies joined with `\n`.
///
/// An all-empty batch merges to an empty string — still valid input to
/// hand the assistant, since the model may still have something to say
/// from prior turn context.
pub struct BatchMerger;

impl BatchMerger {
    pub fn merge(mut fragments: Vec<StagedFragment>) -> String {
        fragments.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.message_sid.cmp(&b.message_sid))
        });

        fragments
            .into_iter()
            .map(|f| f.body)
            .filter(|body| !body.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The `message_sid`s of the merged batch, in merge order — recorded on
    /// the committed assistant-turn-preceding user message so a later audit
    /// can trace which inbound fragments produced which reply.
    pub fn merged_sids(mut fragments: Vec<StagedFragment>) -> Vec<String> {
        fragments.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.message_sid.cmp(&b.message_sid))
        });
        fragments.into_iter().map(|f| f.message_sid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replies_core::types::Channel;

    fn fragment(sid: &str, received_at: &str, body: &str) -> StagedFragment {
        StagedFragment {
            conversation_id: "conv-1".to_string(),
            message_sid: sid.to_string(),
            body: body.to_string(),
            primary_channel: "+15551234567".to_string(),
            channel: Channel::WhatsApp,
            received_at: received_at.to_string(),
            expires_at: "2099-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn merges_in_received_at_order() {
        let fragments = vec![
            fragment("SM2", "2026-01-01T00:00:02Z", "second"),
            fragment("SM1", "2026-01-01T00:00:01Z", "first"),
        ];
        assert_eq!(BatchMerger::merge(fragments), "first\nsecond");
    }

    #[test]
    fn ties_broken_by_message_sid() {
        let fragments = vec![
            fragment("SM2", "2026-01-01T00:00:01Z", "b"),
            fragment("SM1", "2026-01-01T00:00:01Z", "a"),
        ];
        assert_eq!(BatchMerger::merge(fragments), "a\nb");
    }

    #[test]
    fn empty_bodies_are_skipped() {
        let fragments = vec![
            fragment("SM1", "2026-01-01T00:00:01Z", ""),
            fragment("SM2", "2026-01-01T00:00:02Z", "hello"),
        ];
        assert_eq!(BatchMerger::merge(fragments), "hello");
    }

    #[test]
    fn all_empty_batch_merges_to_empty_string() {
        let fragments = vec![
            fragment("SM1", "2026-01-01T00:00:01Z", ""),
            fragment("SM2", "2026-01-01T00:00:02Z", ""),
        ];
        assert_eq!(BatchMerger::merge(fragments), "");
    }

    #[test]
    fn merged_sids_follow_the_same_order() {
        let fragments = vec![
            fragment("SM2", "2026-01-01T00:00:02Z", "second"),
            fragment("SM1", "2026-01-01T00:00:01Z", "first"),
        ];
        assert_eq!(
            BatchMerger::merged_sids(fragments),
            vec!["SM1".to_string(), "SM2".to_string()]
        );
    }
}
