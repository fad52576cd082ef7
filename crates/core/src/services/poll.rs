//! Poll service.

use std::collections::HashMap;

use chrono::Utc;
use huddle_common::{AppError, AppResult, IdGenerator};
use huddle_db::{
    entities::poll_vote,
    repositories::{PollRepository, PollVoteRepository},
};
use serde::Serialize;

use super::change_feed::{ChangeEvent, EventPublisherService};
use super::chat_item::parse_poll_options;

/// Vote count for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionTally {
    pub label: String,
    pub votes: u64,
    /// Share of all votes, rounded to a whole percent.
    pub percentage: u32,
}

/// Current results of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub poll_id: String,
    pub question: String,
    pub options: Vec<OptionTally>,
    pub total_votes: u64,
    /// Option the viewer currently has selected.
    pub my_vote: Option<usize>,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    vote_repo: PollVoteRepository,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(poll_repo: PollRepository, vote_repo: PollVoteRepository) -> Self {
        Self {
            poll_repo,
            vote_repo,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Cast or change a vote. A later vote by the same voter replaces the earlier one.
    pub async fn vote(&self, voter_id: &str, poll_id: &str, option_index: i32) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let options = parse_poll_options(&poll.options)
            .ok_or_else(|| AppError::Internal(format!("Poll {poll_id} has malformed options")))?;

        let in_range = usize::try_from(option_index).is_ok_and(|i| i < options.len());
        if !in_range {
            return Err(AppError::BadRequest("Invalid option index".to_string()));
        }

        self.vote_repo
            .upsert(
                &self.id_gen.generate(),
                poll_id,
                voter_id,
                option_index,
                Utc::now(),
            )
            .await?;

        if let Some(ref event_publisher) = self.event_publisher
            && let Err(e) = event_publisher
                .publish(ChangeEvent::VoteChanged {
                    poll_id: poll_id.to_string(),
                    voter_id: voter_id.to_string(),
                })
                .await
        {
            tracing::warn!(error = %e, "Failed to publish vote event");
        }

        Ok(())
    }

    /// Read the current results of a poll.
    pub async fn results(&self, poll_id: &str, viewer_id: Option<&str>) -> AppResult<PollResults> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let labels = parse_poll_options(&poll.options)
            .ok_or_else(|| AppError::Internal(format!("Poll {poll_id} has malformed options")))?;
        let votes = self.vote_repo.find_by_poll(poll_id).await?;

        let (options, total_votes, my_vote) = tally(&labels, &votes, viewer_id);

        Ok(PollResults {
            poll_id: poll.id,
            question: poll.question,
            options,
            total_votes,
            my_vote,
        })
    }
}

/// Count votes per option.
///
/// Each voter counts once, with their most recently updated vote. Votes for
/// an index outside the option list are ignored.
fn tally(
    labels: &[String],
    votes: &[poll_vote::Model],
    viewer_id: Option<&str>,
) -> (Vec<OptionTally>, u64, Option<usize>) {
    let mut latest: HashMap<&str, &poll_vote::Model> = HashMap::new();
    for vote in votes {
        match latest.get(vote.user_id.as_str()) {
            Some(existing) if existing.updated_at > vote.updated_at => {}
            _ => {
                latest.insert(vote.user_id.as_str(), vote);
            }
        }
    }

    let mut counts = vec![0u64; labels.len()];
    let mut my_vote = None;
    for (voter, vote) in latest {
        let Some(index) = usize::try_from(vote.option_index)
            .ok()
            .filter(|i| *i < labels.len())
        else {
            continue;
        };
        counts[index] += 1;
        if viewer_id == Some(voter) {
            my_vote = Some(index);
        }
    }

    let total: u64 = counts.iter().sum();
    let options = labels
        .iter()
        .zip(counts)
        .map(|(label, votes)| OptionTally {
            label: label.clone(),
            votes,
            percentage: if total == 0 {
                0
            } else {
                (votes as f64 * 100.0 / total as f64).round() as u32
            },
        })
        .collect();

    (options, total, my_vote)
}
