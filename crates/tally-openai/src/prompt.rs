// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt and `book_expense` tool construction.
//!
//! Both are rebuilt on every call: the prompt carries the current time so
//! relative dates resolve, and the tool carries the live category list.

use chrono::{DateTime, Local};
use serde_json::json;

use crate::types::{FunctionDefinition, Tool};

/// Name of the single tool the model is forced to call.
pub const TOOL_NAME: &str = "book_expense";

const ROAST_COMMENT: &str =
    "One short, sharp, humorous remark about this purchase, written directly to the user.";
const PLAIN_COMMENT: &str =
    "Must be exactly the empty string \"\". Do not put any character in this field.";

/// Build the system prompt for one analysis.
pub fn system_prompt(
    now: DateTime<Local>,
    categories: &[String],
    history: &[String],
    roast: bool,
) -> String {
    let mut prompt = format!(
        "You are a bookkeeping assistant. Record the user's expense by calling `{TOOL_NAME}`.\n\
         Current time: {} ({}).\n\
         Resolve relative dates such as \"yesterday\" or \"last Friday\" against the current time.\n\
         Allowed categories: {}.\n\
         If several purchases are mentioned, record their total amount.\n\
         Keep the note short and leave out amounts and date words.\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        now.format("%A"),
        categories.join(", "),
    );

    if !history.is_empty() {
        prompt.push_str(
            "\nThe user's most similar past expenses, formatted as `<when> [<category>] <description>`:\n",
        );
        for line in history {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str(
            "Classify the new expense the way the user classified similar past expenses.\n",
        );
        if roast {
            prompt.push_str(
                "If the history shows repeated spending in the same category, make the remark \
                 noticeably sharper and mention the pattern.\n",
            );
        }
    }

    if roast {
        prompt.push_str("\nRoast mode is on: the comment is a brief, witty jab at the purchase.\n");
    } else {
        prompt.push_str("\nRoast mode is off: the comment must be the empty string.\n");
    }
    prompt
}

/// Build the `book_expense` tool with `categories` as a closed enum.
pub fn book_expense_tool(categories: &[String], roast: bool) -> Tool {
    Tool {
        kind: "function".into(),
        function: FunctionDefinition {
            name: TOOL_NAME.into(),
            description: "Record a single expense: amount, date, category and note.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "amount": {
                        "type": "number",
                        "minimum": 0,
                        "description": "Total amount spent. Sum multiple purchases."
                    },
                    "category": {
                        "type": "string",
                        "enum": categories,
                        "description": "Expense category; must be exactly one of the listed values."
                    },
                    "date": {
                        "type": "string",
                        "description": "Date of the expense as YYYY-MM-DD, inferred from the current time for words like 'yesterday'."
                    },
                    "note": {
                        "type": "string",
                        "description": "Short plain description of what was bought, without amount or date words."
                    },
                    "comment": {
                        "type": "string",
                        "description": if roast { ROAST_COMMENT } else { PLAIN_COMMENT }
                    }
                },
                "required": ["amount", "category", "date", "note", "comment"]
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn categories() -> Vec<String> {
        ["Food", "Transport", "Shopping"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 6, 9, 30, 0).unwrap()
    }

    #[test]
    fn prompt_carries_time_weekday_and_categories() {
        let prompt = system_prompt(fixed_now(), &categories(), &[], true);
        assert!(prompt.contains("2026-03-06 09:30:00"));
        assert!(prompt.contains("Friday"));
        assert!(prompt.contains("Food, Transport, Shopping"));
        assert!(prompt.contains("total amount"));
        assert!(prompt.contains("leave out amounts and date words"));
    }

    #[test]
    fn history_block_only_with_history() {
        let cold = system_prompt(fixed_now(), &categories(), &[], true);
        assert!(!cold.contains("past expenses"));
        assert!(!cold.contains("sharper"));

        let history = vec!["today [Transport] taxi to airport".to_string()];
        let warm = system_prompt(fixed_now(), &categories(), &history, true);
        assert!(warm.contains("- today [Transport] taxi to airport"));
        assert!(warm.contains("Classify the new expense the way the user"));
        assert!(warm.contains("sharper"));
        assert_ne!(cold, warm);
    }

    #[test]
    fn no_escalation_without_roast() {
        let history = vec!["yesterday [Food] latte".to_string()];
        let prompt = system_prompt(fixed_now(), &categories(), &history, false);
        assert!(!prompt.contains("sharper"));
        assert!(prompt.contains("must be the empty string"));
    }

    #[test]
    fn tool_schema_requires_all_fields_and_enumerates_categories() {
        let tool = book_expense_tool(&categories(), true);
        assert_eq!(tool.kind, "function");
        assert_eq!(tool.function.name, "book_expense");
        let params = &tool.function.parameters;
        assert_eq!(
            params["required"],
            json!(["amount", "category", "date", "note", "comment"])
        );
        assert_eq!(
            params["properties"]["category"]["enum"],
            json!(["Food", "Transport", "Shopping"])
        );
        assert_eq!(params["properties"]["amount"]["minimum"], 0);
        assert!(params["properties"]["amount"]["description"]
            .as_str()
            .unwrap()
            .contains("Sum multiple"));
    }

    #[test]
    fn comment_description_follows_roast_flag() {
        let on = book_expense_tool(&categories(), true);
        let off = book_expense_tool(&categories(), false);
        let desc = |t: &Tool| {
            t.function.parameters["properties"]["comment"]["description"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert!(desc(&on).contains("humorous"));
        assert!(desc(&off).contains("empty string"));
    }
}
