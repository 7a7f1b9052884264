use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use tracing::debug;

use crate::config::DuplicateConfig;
use crate::model::{
    DuplicateBasis, DuplicateCandidatePair, DuplicateConfidence, DuplicateGroup, UnifiedMessage,
};

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Lowercase and collapse all whitespace runs to a single space.
pub fn normalize_body(body: &str) -> String {
    body.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity of two normalized bodies, in [0, 1].
pub fn body_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

// ---------------------------------------------------------------------------
// Sliding window detection
// ---------------------------------------------------------------------------

/// A message eligible for comparison, with its body pre-normalized.
struct Candidate<'a> {
    msg: &'a UnifiedMessage,
    sender: &'a str,
    recipient: &'a str,
    body: String,
}

impl<'a> Candidate<'a> {
    /// Messages without sender, recipient or body text are never compared.
    fn from_message(msg: &'a UnifiedMessage) -> Option<Self> {
        let sender = msg.sender.as_deref()?;
        let recipient = msg.recipient.as_deref()?;
        let body = normalize_body(msg.body.as_deref()?);
        if body.is_empty() {
            return None;
        }
        Some(Self {
            msg,
            sender,
            recipient,
            body,
        })
    }
}

/// Find candidate duplicate pairs among unified messages.
///
/// Messages are ordered by `(sent_at, id)` and each one is compared only
/// with the following messages whose `sent_at` is at most `window_secs`
/// later (inclusive). Output is sorted by `(first_id, second_id)`.
pub fn find_duplicates(
    unified: &[UnifiedMessage],
    config: &DuplicateConfig,
) -> Vec<DuplicateCandidatePair> {
    let window = config.window();

    let mut timeline: Vec<Candidate> = unified.iter().filter_map(Candidate::from_message).collect();
    timeline.sort_by(|a, b| {
        a.msg
            .sent_at
            .cmp(&b.msg.sent_at)
            .then_with(|| a.msg.id.cmp(&b.msg.id))
    });

    let mut pairs = Vec::new();
    let mut comparisons: usize = 0;

    for (i, left) in timeline.iter().enumerate() {
        for right in &timeline[i + 1..] {
            let delta = right.msg.sent_at - left.msg.sent_at;
            if delta > window {
                break;
            }
            if left.msg.id == right.msg.id {
                continue;
            }
            comparisons += 1;
            if let Some(pair) = compare(left, right, delta, config) {
                pairs.push(pair);
            }
        }
    }

    pairs.sort_by(|a, b| {
        a.first_id
            .cmp(&b.first_id)
            .then_with(|| a.second_id.cmp(&b.second_id))
    });

    debug!(
        eligible = timeline.len(),
        comparisons,
        pairs = pairs.len(),
        "duplicate scan complete"
    );
    pairs
}

fn compare(
    left: &Candidate,
    right: &Candidate,
    delta: Duration,
    config: &DuplicateConfig,
) -> Option<DuplicateCandidatePair> {
    if left.sender != right.sender || left.recipient != right.recipient {
        return None;
    }

    let (basis, confidence, similarity) = if left.body == right.body {
        (DuplicateBasis::ExactContent, DuplicateConfidence::Exact, 1.0)
    } else {
        let similarity = body_similarity(&left.body, &right.body);
        if similarity >= config.likely_threshold {
            (DuplicateBasis::Fuzzy, DuplicateConfidence::Likely, similarity)
        } else if similarity >= config.possible_threshold {
            (DuplicateBasis::Fuzzy, DuplicateConfidence::Possible, similarity)
        } else {
            return None;
        }
    };

    let (first, second) = if left.msg.id <= right.msg.id {
        (left.msg, right.msg)
    } else {
        (right.msg, left.msg)
    };

    Some(DuplicateCandidatePair {
        first_id: first.id.clone(),
        second_id: second.id.clone(),
        basis,
        confidence,
        similarity,
        time_delta_secs: delta.num_seconds(),
    })
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Merge pairs into connected groups. Groups are ordered by their smallest
/// member id and carry the strongest confidence of any pair inside them.
pub fn group_pairs(pairs: &[DuplicateCandidatePair]) -> Vec<DuplicateGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut ids: Vec<&str> = Vec::new();
    for pair in pairs {
        for id in [pair.first_id.as_str(), pair.second_id.as_str()] {
            index.entry(id).or_insert_with(|| {
                ids.push(id);
                ids.len() - 1
            });
        }
    }

    let mut parent: Vec<usize> = (0..ids.len()).collect();
    for pair in pairs {
        let a = find(&mut parent, index[pair.first_id.as_str()]);
        let b = find(&mut parent, index[pair.second_id.as_str()]);
        if a != b {
            parent[a.max(b)] = a.min(b);
        }
    }

    let mut groups: BTreeMap<usize, (Vec<String>, DuplicateConfidence, usize)> = BTreeMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = find(&mut parent, i);
        groups
            .entry(root)
            .or_insert_with(|| (Vec::new(), DuplicateConfidence::Possible, 0))
            .0
            .push(id.to_string());
    }
    for pair in pairs {
        let root = find(&mut parent, index[pair.first_id.as_str()]);
        if let Some(entry) = groups.get_mut(&root) {
            entry.1 = entry.1.max(pair.confidence);
            entry.2 += 1;
        }
    }

    let mut out: Vec<(Vec<String>, DuplicateConfidence, usize)> = groups
        .into_values()
        .map(|(mut members, confidence, count)| {
            members.sort();
            (members, confidence, count)
        })
        .collect();
    out.sort_by(|a, b| a.0.first().cmp(&b.0.first()));

    out.into_iter()
        .enumerate()
        .map(|(n, (message_ids, confidence, pair_count))| DuplicateGroup {
            group_id: format!("dup_{}", n + 1),
            message_ids,
            confidence,
            pair_count,
        })
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
