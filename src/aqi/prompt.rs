use crate::config::SummarySelection;
use crate::feed::Feed;

/// Appended verbatim to the selected summary text.
pub const INSTRUCTION: &str = "Parse the following HTML. There are 3 AQI Values. Format them as an array of numbers and DO NOT PREPEND OR APPEND ANYTHING ELSE TO YOUR MESSAGE.";

/// Joins summaries taken from several feeds.
pub const SUMMARY_SEPARATOR: &str = "\n\n";

/// Builds the text sent to the model: `summary` immediately followed by
/// [`INSTRUCTION`], with no separator.
pub fn build_prompt(summary: &str) -> String {
    let mut prompt = String::with_capacity(summary.len() + INSTRUCTION.len());
    prompt.push_str(summary);
    prompt.push_str(INSTRUCTION);
    prompt
}

/// Picks the summary text for the prompt out of the fetched feeds.
///
/// Blank summaries are treated like missing ones. Returns `None` when
/// nothing usable is left.
pub fn select_summary<'a, I>(feeds: I, selection: SummarySelection) -> Option<String>
where
    I: IntoIterator<Item = &'a Feed>,
{
    match selection {
        SummarySelection::LatestPerFeed => {
            let summaries: Vec<&str> = feeds
                .into_iter()
                .filter_map(|feed| {
                    feed.entries()
                        .filter_map(|e| e.summary.as_deref())
                        .find(|s| !s.trim().is_empty())
                })
                .collect();

            if summaries.is_empty() {
                None
            } else {
                Some(summaries.join(SUMMARY_SEPARATOR))
            }
        }
        SummarySelection::LastEntry => feeds
            .into_iter()
            .flat_map(|feed| feed.entries())
            .last()
            .and_then(|e| e.summary.clone())
            .filter(|s| !s.trim().is_empty()),
    }
}
