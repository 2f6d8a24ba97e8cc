use std::collections::HashMap;

use crate::matcher::CandidateMatch;

/// One match per (user, message): the closest. Output keeps the order in
/// which each pair was first seen.
pub fn deduplicate_matches(matches: Vec<CandidateMatch>) -> Vec<CandidateMatch> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut out: Vec<CandidateMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        let key = (m.user_id.clone(), m.message_id.clone());
        match index.get(&key) {
            Some(&i) => {
                if m.distance_m < out[i].distance_m {
                    out[i] = m;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(m);
            }
        }
    }
    out
}
