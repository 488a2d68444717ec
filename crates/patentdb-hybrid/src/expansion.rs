//! Hypothetical-document query expansion (HyDE).
//!
//! Questions and answer-like passages live in different lexical registers;
//! embedding a plausible answer instead of the question closes that gap.
//! Expansion is a pure enhancement: any generator failure degrades to the
//! raw query with a warning and never fails the search.

use tracing::warn;

use patentdb_core::config::ExpansionMode;
use patentdb_core::error::Result;
use patentdb_core::traits::QueryExpander;

/// Weight of the raw query in multi-variant fusion; hypothetical documents
/// count half as much.
pub const RAW_QUERY_WEIGHT: f32 = 1.0;
pub const HYPOTHETICAL_WEIGHT: f32 = 0.5;

/// Hypothetical documents generated per query in `multiple` mode.
const MAX_HYPOTHETICALS: usize = 2;

/// Resolve the dense-leg query variants for `query` under `mode`.
///
/// Returns (text, fusion weight) pairs. With no expander configured,
/// `single` and `multiple` behave exactly like `none`.
pub fn expand_query(
    expander: Option<&dyn QueryExpander>,
    mode: ExpansionMode,
    query: &str,
) -> Vec<(String, f32)> {
    let raw = vec![(query.to_string(), RAW_QUERY_WEIGHT)];
    let Some(expander) = expander else {
        return raw;
    };
    match mode {
        ExpansionMode::None => raw,
        ExpansionMode::Single => match expander.expand(query, 1) {
            Ok(mut docs) if !docs.is_empty() => vec![(docs.remove(0), RAW_QUERY_WEIGHT)],
            Ok(_) => raw,
            Err(e) => {
                warn!(error = %e, "query expansion failed, using raw query");
                raw
            }
        },
        ExpansionMode::Multiple => match expander.expand(query, MAX_HYPOTHETICALS) {
            Ok(docs) => {
                let mut variants = raw;
                variants.extend(docs.into_iter().map(|d| (d, HYPOTHETICAL_WEIGHT)));
                variants
            }
            Err(e) => {
                warn!(error = %e, "query expansion failed, using raw query");
                vec![(query.to_string(), RAW_QUERY_WEIGHT)]
            }
        },
    }
}

/// Offline expander built from patent-law phrasing templates.
///
/// Needs no external generation service, so expansion keeps working without
/// network or model access. An external generator can replace it behind the
/// same trait.
pub struct RuleBasedExpander;

impl RuleBasedExpander {
    pub fn new() -> Self {
        Self
    }

    fn templates(query: &str) -> Vec<String> {
        let q = query.to_lowercase();
        let mut out = Vec::new();

        if q.contains("claim") {
            if q.contains("definite") {
                out.push(
                    "Under 35 USC 112(b), patent claims must particularly point out and \
                     distinctly claim the subject matter of the invention. The claim language \
                     must inform those skilled in the art of the scope of the claimed invention \
                     with reasonable certainty."
                        .to_string(),
                );
            }
            if q.contains("antecedent") || q.contains("basis") {
                out.push(
                    "Proper antecedent basis requires that each element referred to using 'the' \
                     or 'said' was previously introduced in the claim using 'a' or 'an', \
                     preventing ambiguity about which elements are referenced."
                        .to_string(),
                );
            }
            if q.contains("dependent") {
                out.push(
                    "A dependent claim refers back to and further limits a previous claim, \
                     incorporating all limitations of the claim to which it refers."
                        .to_string(),
                );
            }
        }

        if q.contains("specification") || q.contains("description") {
            out.push(
                "The written description requirement under 35 USC 112(a) mandates that the \
                 specification describe the invention in sufficient detail to show the inventor \
                 possessed the claimed invention at the time of filing."
                    .to_string(),
            );
        }
        if q.contains("enable") || q.contains("enablement") {
            out.push(
                "Under 35 USC 112(a), the specification must enable a person skilled in the art \
                 to make and use the full scope of the claimed invention without undue \
                 experimentation."
                    .to_string(),
            );
        }

        if q.contains("abstract") {
            out.push(
                "The abstract must be a brief summary of the technical disclosure, preferably \
                 150 words or less, enabling the reader to quickly determine the nature and \
                 gist of the disclosure."
                    .to_string(),
            );
        }
        if q.contains("drawing") {
            out.push(
                "Patent drawings must show every feature of the invention specified in the \
                 claims and follow specific rules regarding margins, views, reference \
                 characters, and arrangement."
                    .to_string(),
            );
        }

        if q.contains("101") || q.contains("eligible") {
            out.push(
                "35 USC 101 defines patent-eligible subject matter: processes, machines, \
                 manufactures, and compositions of matter. Abstract ideas, laws of nature, and \
                 natural phenomena are not patentable."
                    .to_string(),
            );
        }
        if q.contains("102") || q.contains("novelty") {
            out.push(
                "35 USC 102 bars a patent when the claimed invention was patented, described in \
                 a printed publication, or otherwise available to the public before the \
                 effective filing date."
                    .to_string(),
            );
        }
        if q.contains("103") || q.contains("obvious") {
            out.push(
                "35 USC 103 prohibits patents on inventions that would have been obvious to a \
                 person having ordinary skill in the art, weighed through the Graham factors."
                    .to_string(),
            );
        }

        if out.is_empty() {
            out.push(format!(
                "In patent examination practice, regarding {query}, the relevant statutory and \
                 regulatory provisions establish specific requirements and procedures for \
                 prosecution and examination."
            ));
        }
        out
    }
}

impl Default for RuleBasedExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander for RuleBasedExpander {
    fn expand(&self, query: &str, n: usize) -> Result<Vec<String>> {
        let mut docs = Self::templates(query);
        docs.truncate(n);
        Ok(docs)
    }
}
