use crate::ContentRequest;

/// Fixed opening of every prompt. Establishes the output contract the result shaper relies on.
pub const PROMPT_PREAMBLE: &str = "You are an experienced editor. Revise the text that follows the instructions below.\n\
Respond only with a single JSON object containing exactly two properties: \
\"revised_text\" (string), the full revised text, and \"suggestions\" (array of string), \
short notes on what was changed or could be improved further.\n\
Do not wrap the JSON in Markdown and do not add any other commentary.\n\n";

pub const GRAMMAR_DIRECTIVE: &str = "Fix grammar, spelling, and punctuation mistakes.";
pub const CREATIVE_DIRECTIVE: &str =
    "Make the writing more creative and engaging with vivid word choices.";
pub const PROFESSIONAL_DIRECTIVE: &str =
    "Make the tone more professional and suitable for a business audience.";
pub const KEEP_LENGTH_DIRECTIVE: &str =
    "Keep the revised text roughly the same length as the original.";

/// Build the instruction string sent to the completion endpoint.
///
/// Layout: [`PROMPT_PREAMBLE`], then one `- <directive>` line per enabled flag (grammar,
/// creativity, professionalism, length) followed by a blank line, then the original content
/// verbatim. With no flags enabled the output is exactly the preamble followed by the content.
pub fn build_prompt(request: &ContentRequest) -> String {
    let options = request.options();
    let directives = [
        (options.improve_grammar, GRAMMAR_DIRECTIVE),
        (options.make_creative, CREATIVE_DIRECTIVE),
        (options.make_professional, PROFESSIONAL_DIRECTIVE),
        (options.keep_length, KEEP_LENGTH_DIRECTIVE),
    ];

    let content = request.content();
    let mut out = String::with_capacity(PROMPT_PREAMBLE.len() + 256 + content.len());
    out.push_str(PROMPT_PREAMBLE);

    let mut any = false;
    for (_, directive) in directives.iter().filter(|(enabled, _)| *enabled) {
        out.push_str("- ");
        out.push_str(directive);
        out.push('\n');
        any = true;
    }
    if any {
        out.push('\n');
    }

    out.push_str(content);
    out
}
