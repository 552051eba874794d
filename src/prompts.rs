//! Prompt templates for the three completion calls.
//!
//! Each template is a system message plus a user message with `{name}`
//! placeholders, filled from [`Prompt::variables`].

use rulebook_rag_core::completion::{Prompt, PromptTemplate};

pub struct ChatTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

const ANSWER: ChatTemplate = ChatTemplate {
    system: "You are an expert on tabletop roleplaying rulebooks, acting as a wise and precise game master.

Before answering:
1. Read the whole CONTEXT.
2. Identify which parts of it answer the QUESTION.
3. Use information from previous sub-questions when it is relevant.
4. Check that every statement is supported by the context.

Rules:
- Use ONLY information present in the CONTEXT, including previous sub-questions.
- If the context is insufficient, say: \"The provided information is not enough to answer this question.\"
- The context marks sources as [SOURCE: Book, Page: X]. Cite them after each specific claim as *(Source: Book, Page: X)*.
- Answer directly; use bullet points when they help.",
    user: "CONTEXT:
{context}

QUESTION:
{question}

EXPERT ANSWER:",
};

const DECOMPOSE: ChatTemplate = ChatTemplate {
    system: "You decompose rules questions for a retrieval system. Split the ORIGINAL QUESTION into a numbered list of simple sub-questions.

The first sub-question is answered only from retrieved rulebook text; later ones also see the earlier sub-questions and their answers. Together the answers must cover the original question.

Guidelines:
1. Each sub-question asks about one fact or rule.
2. Order them from general to specific; put dependent questions after what they depend on.
3. Use the rulebook's official terminology.
4. If the ORIGINAL QUESTION is already atomic, return it unchanged, without numbering.
5. Output only the numbered list (or the single question), with no introduction.
6. Include at least one key term from the original question in every sub-question.
7. Do not repeat a concept already covered.
8. Stop when no further useful sub-question comes to mind.",
    user: "ORIGINAL QUESTION:
{question}

SUB-QUESTIONS:",
};

const SYNTHESIZE: ChatTemplate = ChatTemplate {
    system: "You are an expert, didactic game master. Combine ALL the available information into a complete and precise answer to the ORIGINAL QUESTION.

You have:
1. SUB-QUESTION ANSWERS: specific facts obtained by breaking the question down.
2. CONTEXT: rulebook text retrieved for the original question, marked [SOURCE: Book, Page: X].

Instructions:
- Use the sub-question answers for specifics and the context to complement and verify them.
- When information repeats, keep the most complete version.
- Say clearly when something crucial is missing.
- Do not mistake sub-question details for facts about the original question.
- If a rule applies to a general group but the question names a specific member, give the general rule and explain that.
- Cite every specific claim as *(Source: Book, Page: X)*.

Format: start with a short direct answer (two or three lines), then a detailed explanation from general to specific.
Use ONLY the information provided; never invent rules or examples.",
    user: "ORIGINAL QUESTION:
{original_question}

SUB-QUESTION ANSWERS:
{sub_question_context}

CONTEXT:
{context}

SYNTHESIZED ANSWER:",
};

pub fn template(id: PromptTemplate) -> &'static ChatTemplate {
    match id {
        PromptTemplate::Answer => &ANSWER,
        PromptTemplate::Decompose => &DECOMPOSE,
        PromptTemplate::Synthesize => &SYNTHESIZE,
    }
}

/// Render a prompt into `(system, user)` message texts.
pub fn render(prompt: &Prompt<'_>) -> (String, String) {
    let tpl = template(prompt.template());
    let vars = prompt.variables();
    (fill(tpl.system, &vars), fill(tpl.user, &vars))
}

/// Replace `{name}` placeholders in a single pass, so values that contain
/// braces are inserted verbatim.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_answer_fills_both_variables() {
        let (system, user) = render(&Prompt::Answer {
            context: "[SOURCE: phb.md, Page: 1]\ntext",
            question: "What?",
        });
        assert!(system.contains("[SOURCE: Book, Page: X]"));
        assert!(user.starts_with("CONTEXT:\n[SOURCE: phb.md, Page: 1]\ntext"));
        assert!(user.contains("QUESTION:\nWhat?"));
        assert!(!user.contains("{question}"));
    }

    #[test]
    fn test_values_with_braces_are_not_expanded() {
        let out = fill("{a} and {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b} and x");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        assert_eq!(fill("{missing} {", &[]), "{missing} {");
    }

    #[test]
    fn test_every_template_uses_all_its_variables() {
        let prompts = [
            Prompt::Answer { context: "C", question: "Q" },
            Prompt::Decompose { question: "Q" },
            Prompt::Synthesize {
                original_question: "O",
                sub_question_context: "S",
                context: "C",
            },
        ];
        for prompt in prompts {
            let tpl = template(prompt.template());
            for (name, _) in prompt.variables() {
                assert!(tpl.user.contains(&format!("{{{}}}", name)), "{} missing", name);
            }
        }
    }
}
