use std::fmt;

/// The six server-side prompt templates a bot can be initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    QuizSolving,
    QuizCreation,
    AssignmentSolving,
    AssignmentCreation,
    PaperSolving,
    PaperCreation,
}

impl PromptTemplate {
    pub fn tag(self) -> &'static str {
        match self {
            PromptTemplate::QuizSolving => "quiz_solving",
            PromptTemplate::QuizCreation => "quiz_creation",
            PromptTemplate::AssignmentSolving => "assignment_solving",
            PromptTemplate::AssignmentCreation => "assignment_creation",
            PromptTemplate::PaperSolving => "paper_solving",
            PromptTemplate::PaperCreation => "paper_creation",
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Maps a free-form task description to a prompt template. Total: anything
/// unrecognized falls back to quiz solving.
pub fn derive_template(task: &str) -> PromptTemplate {
    let task = task.to_lowercase();

    if task.contains("solve") {
        if task.contains("assignment") {
            return PromptTemplate::AssignmentSolving;
        }
        if task.contains("paper") {
            return PromptTemplate::PaperSolving;
        }
        return PromptTemplate::QuizSolving;
    }

    if task.contains("create") {
        if task.contains("quiz") {
            return PromptTemplate::QuizCreation;
        }
        if task.contains("assignment") {
            return PromptTemplate::AssignmentCreation;
        }
        if task.contains("paper") {
            return PromptTemplate::PaperCreation;
        }
    }

    PromptTemplate::QuizSolving
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_six_task_strings() {
        let cases = [
            ("Solve Quiz", PromptTemplate::QuizSolving),
            ("Solve Assignment", PromptTemplate::AssignmentSolving),
            ("Solve Paper", PromptTemplate::PaperSolving),
            ("Create Quiz", PromptTemplate::QuizCreation),
            ("Create Assignment", PromptTemplate::AssignmentCreation),
            ("Create Paper", PromptTemplate::PaperCreation),
        ];
        for (task, expected) in cases {
            assert_eq!(derive_template(task), expected, "task: {task}");
        }
    }

    #[test]
    fn unknown_tasks_default_to_quiz_solving() {
        assert_eq!(derive_template(""), PromptTemplate::QuizSolving);
        assert_eq!(derive_template("Grade Homework"), PromptTemplate::QuizSolving);
        assert_eq!(derive_template("create"), PromptTemplate::QuizSolving);
    }
}
