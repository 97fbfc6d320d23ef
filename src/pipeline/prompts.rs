//! Prompt builders for each model-backed stage.

use chrono::NaiveDate;

use crate::llm::Prompt;
use crate::pipeline::stages::truncate_chars;
use crate::pipeline::state::{Draft, Outline, OutlineArticle, RawItem, SummarizedItem};

const TOPIC: &str = "AI agent development, multi-agent systems and agentic workflows";

/// Summary, entities and trends for one source item.
pub fn extraction(item: &RawItem, max_summary_len: usize, max_chunk: usize) -> Prompt {
    let system = format!(
        "You are an expert researcher covering {TOPIC}. Analyze raw articles and extract \
         what matters: new frameworks, research breakthroughs, significant applications and \
         emerging concepts. Write a concise summary of 2-4 sentences and identify key \
         entities and trends."
    );
    let user = format!(
        "Analyze the following article and provide:\n\n\
         1. A concise summary (2-4 sentences, at most {max_summary_len} characters) focused on agent relevance.\n\
         2. A JSON array of strings with the key entities (e.g. [\"LangGraph\", \"CrewAI\"]).\n\
         3. A JSON array of strings with emerging trends or implications for the field.\n\n\
         Article Title: {title}\n\
         Article URL: {url}\n\
         Article Content:\n{content}\n\n\
         Respond with a JSON object with the keys \"summary\", \"key_entities\" and \
         \"trends_identified\". Use double quotes for every key and string.\n\
         Example:\n\
         ```json\n\
         {{\"summary\": \"...\", \"key_entities\": [\"LangGraph\"], \"trends_identified\": [\"autonomous research\"]}}\n\
         ```",
        title = item.title,
        url = item.url,
        content = truncate_chars(&item.content, max_chunk),
    );
    Prompt::new(system, user)
}

/// Shorten an over-long summary.
pub fn resummarize(text: &str, max_summary_len: usize) -> Prompt {
    Prompt::new(
        format!(
            "You are an expert summarizer. Shorten the given text to at most \
             {max_summary_len} characters while keeping its core meaning and its relevance \
             to {TOPIC}. Reply with the shortened text only."
        ),
        format!("Shorten the following text:\n\n{text}"),
    )
}

/// Relevance score and category for one summarized item.
pub fn scoring(item: &SummarizedItem, categories: &[String]) -> Prompt {
    let system = format!(
        "You are an expert editor for a weekly newsletter on {TOPIC}. Evaluate a summarized \
         article for relevance and assign a score from 0.0 (not relevant) to 1.0 (highly \
         relevant). Assign it to the most appropriate category from the list given. Favour \
         novel, impactful or practical content. Give clearly off-topic articles 0.2 or less."
    );
    let user = format!(
        "Evaluate the following summarized article:\n\n\
         Title: {title}\n\
         Summary: {summary}\n\
         Key Entities: {entities}\n\
         Trends Identified: {trends}\n\n\
         Available Categories: {categories}\n\n\
         Respond with a JSON object with the keys \"relevance_score\" (number) and \"category\" (string).\n\
         Example:\n\
         ```json\n\
         {{\"relevance_score\": 0.85, \"category\": \"New Frameworks & Tools\"}}\n\
         ```",
        title = item.title,
        summary = item.summary,
        entities = item.key_entities.join(", "),
        trends = item.trends.join(", "),
        categories = categories.join(", "),
    );
    Prompt::new(system, user)
}

/// Outline for the selected articles.
pub fn outline(articles: &[OutlineArticle]) -> Prompt {
    let system = "You are an expert newsletter editor. Build a compelling, well-structured \
                  outline for a weekly newsletter from the summarized articles given. Group \
                  articles by category and identify overarching themes for the introduction \
                  and conclusion.";
    let user = format!(
        "Here are the articles selected for this week's newsletter:\n\n\
         ```json\n{articles}\n```\n\n\
         Produce an outline with:\n\
         1. An introduction with 2-3 key points for the week.\n\
         2. One section per category that has articles, each listing its articles (title, summary, URL, category).\n\
         3. A conclusion with 1-2 takeaways or forward-looking statements.\n\
         4. A list of the overall trends of the week.\n\n\
         Respond with a JSON object shaped like:\n\
         ```json\n\
         {{\"introduction_points\": [\"...\"], \"sections\": [{{\"name\": \"Category Name\", \"articles\": [{{\"title\": \"...\", \"summary\": \"...\", \"url\": \"...\", \"category\": \"...\"}}]}}], \"conclusion_points\": [\"...\"], \"overall_trends\": [\"...\"]}}\n\
         ```",
        articles = serde_json::to_string_pretty(articles).unwrap_or_default(),
    );
    Prompt::new(system, user)
}

/// Markdown newsletter from the outline. A previous draft and its review
/// turn this into a revision request.
pub fn generation(
    outline: &Outline,
    date: NaiveDate,
    subject_prefix: &str,
    previous: Option<&Draft>,
) -> Prompt {
    let system = format!(
        "You are a professional, engaging newsletter writer covering {TOPIC}. Turn a \
         structured outline into a complete weekly newsletter in Markdown. Use clear \
         headings (## Section) and lists for articles. Transfer information accurately from \
         the summaries. Output the Markdown content only, with no conversational filler."
    );
    let mut user = format!(
        "Write this week's newsletter from the outline below. The current date is {date}; \
         include it in the subject line.\n\n\
         ```json\n{outline}\n```\n\n\
         Start with the subject line, then the introduction, each section, and the conclusion. \
         For each article include its title, a concise summary and a link to the original URL. \
         Do not display the category of each article.\n\
         Example subject line: '# {prefix}{date} Top Trends'\n\
         Example article:\n\
         ### [Article Title](Article URL)\n\
         - Summary: Article summary\n\n\
         Output valid Markdown only. No preamble and no 'Subject:' label.",
        date = date.format("%Y-%m-%d"),
        outline = serde_json::to_string_pretty(outline).unwrap_or_default(),
        prefix = subject_prefix,
    );
    if let Some(draft) = previous.filter(|d| !d.is_empty()) {
        user.push_str(&format!(
            "\n\nThis is a revision. The previous draft scored {score:.2}. Address this editorial \
             feedback:\n\n{feedback}\n\nPrevious draft:\n\n```markdown\n{body}\n```",
            score = draft.approval_score,
            feedback = draft.feedback,
            body = draft.content_markdown,
        ));
    }
    Prompt::new(system, user)
}

/// Judge prompt for a draft, with the source summaries for fact checking.
pub fn review(draft: &Draft, items: &[SummarizedItem], threshold: f64) -> Prompt {
    let system = format!(
        "You are an impartial, analytical editor reviewing a newsletter on {TOPIC}. Score the \
         draft against the rubric and reply with a JSON object only.\n\n\
         Rubric:\n\
         1. Factual accuracy (0.3): matches the source summaries, no fabrication, working URLs.\n\
         2. Relevance and focus (0.25): every article is on topic.\n\
         3. Clarity and concision (0.2): clear language, no repetition.\n\
         4. Tone and engagement (0.15): professional, informative, a real introduction and wrap-up.\n\
         5. Formatting and structure (0.1): valid Markdown, consistent headings.\n\n\
         A quality_score of {threshold:.2} or more means the draft ships. Below that, the \
         feedback must give concrete, actionable advice.\n\n\
         Output shape:\n\
         ```json\n\
         {{\"quality_score\": 0.0, \"feedback\": \"...\", \"issues_found\": [{{\"type\": \"Factual Accuracy\", \"description\": \"...\"}}]}}\n\
         ```"
    );
    let user = format!(
        "Review this newsletter draft:\n\n\
         ```markdown\nSubject: {subject}\n\n{body}\n```\n\n\
         Source summaries for fact checking:\n\n\
         ```json\n{items}\n```\n\n\
         Reply with the JSON object only.",
        subject = draft.subject,
        body = draft.content_markdown,
        items = serde_json::to_string_pretty(items).unwrap_or_default(),
    );
    Prompt::new(system, user)
}
