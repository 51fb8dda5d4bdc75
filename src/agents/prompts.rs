//! 三个 Agent 的 prompt 模板

use crate::agents::ContextEntry;

pub fn task_creation(objective: &str, result: &str, task_description: &str, pending: &[String]) -> String {
    format!(
        "You are a task creation AI that uses the result of an execution agent to create new tasks \
         with the following objective: {objective}. The last completed task has the result: {result}. \
         This result was based on this task description: {task_description}. \
         These are incomplete tasks: {pending}. \
         Based on the result, create new tasks to be completed by the AI system that do not overlap \
         with incomplete tasks. Return the tasks one per line, with no other text.",
        pending = pending.join(", ")
    )
}

pub fn prioritization(objective: &str, task_names: &[String], next_task_id: u64) -> String {
    format!(
        "You are a task prioritization AI tasked with cleaning the formatting of and reprioritizing \
         the following tasks: {tasks}. Consider the ultimate objective of your team: {objective}. \
         Do not remove any tasks. Return the result as a numbered list, like:\n\
         #. First task\n\
         #. Second task\n\
         Start the task list with number {next_task_id}.",
        tasks = task_names.join(", ")
    )
}

pub fn execution(objective: &str, context: &[ContextEntry], task: &str) -> String {
    let context = if context.is_empty() {
        "none".to_string()
    } else {
        context
            .iter()
            .map(|c| format!("\n- {}: {}", c.task_name, c.result_text))
            .collect::<String>()
    };
    format!(
        "You are an AI who performs one task based on the following objective: {objective}.\n\
         Take into account these previously completed tasks: {context}\n\
         Your task: {task}\n\
         Response:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prioritization_mentions_start_number() {
        let p = prioritization("Plan a trip", &["Book flights".into(), "Pack bags".into()], 2);
        assert!(p.contains("Book flights, Pack bags"));
        assert!(p.trim_end().ends_with("Start the task list with number 2."));
    }

    #[test]
    fn test_execution_context_rendering() {
        let empty = execution("o", &[], "t");
        assert!(empty.contains("previously completed tasks: none"));

        let ctx = vec![ContextEntry {
            task_name: "Research destinations".into(),
            result_text: "Lisbon".into(),
            score: 0.9,
        }];
        let p = execution("o", &ctx, "Book flights");
        assert!(p.contains("- Research destinations: Lisbon"));
        assert!(p.ends_with("Your task: Book flights\nResponse:"));
    }

    #[test]
    fn test_creation_lists_pending() {
        let p = task_creation("o", "r", "d", &["a".into(), "b".into()]);
        assert!(p.contains("These are incomplete tasks: a, b."));
    }
}
