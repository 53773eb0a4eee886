//! System prompts for the stage workers, bundled at compile time.

/// Planner - extracts structured requirements from the query
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// Researcher - surveys technologies, challenges and patterns
pub const RESEARCHER: &str = include_str!("defaults/researcher.md");

/// Architect - synthesizes the system architecture
pub const ARCHITECT: &str = include_str!("defaults/architect.md");

/// Visualizer - renders the architecture as Mermaid diagrams
pub const VISUALIZER: &str = include_str!("defaults/visualizer.md");

/// Critic - scores architecture quality on seven criteria
pub const CRITIC: &str = include_str!("defaults/critic.md");

/// Meta-Critic - flags hallucination and bias
pub const META_CRITIC: &str = include_str!("defaults/meta_critic.md");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        let prompts = [
            ("plan", PLANNER),
            ("research", RESEARCHER),
            ("architect", ARCHITECT),
            ("visualize", VISUALIZER),
            ("critique", CRITIC),
            ("meta_critique", META_CRITIC),
        ];
        for (stage, content) in prompts {
            assert!(content.len() > 50, "Prompt for '{}' seems too short", stage);
        }
    }

    #[test]
    fn test_critic_prompt_names_every_criterion() {
        for criterion in crate::stages::critic::CRITERIA {
            assert!(
                CRITIC.contains(criterion),
                "critic prompt does not mention '{}'",
                criterion
            );
        }
    }
}
