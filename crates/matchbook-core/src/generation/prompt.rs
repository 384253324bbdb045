use crate::models::{Perspective, ProjectProfile, SeekerProfile};

const MAX_INTRO_CHARS: usize = 600;

/// Renders the generator prompt for one side of a match.
pub fn build_prompt(
    seeker: &SeekerProfile,
    project: &ProjectProfile,
    perspective: Perspective,
) -> String {
    let mut prompt = String::new();

    match perspective {
        Perspective::Seeker => {
            prompt.push_str(
                "In two or three sentences, tell the collaborator below why the project is a good match for them. \
                 Address the collaborator directly.\n\n",
            );
        }
        Perspective::Owner => {
            prompt.push_str(
                "In two or three sentences, tell the owner of the project below why this collaborator is a good match. \
                 Address the project owner directly.\n\n",
            );
        }
    }

    prompt.push_str("Collaborator\n");
    prompt.push_str(&format!("- name: {}\n", seeker.display_name.trim()));
    prompt.push_str(&format!("- skills: {}\n", join_or_none(&seeker.skills)));
    if let Some(work_style) = seeker.work_style.as_deref().map(str::trim)
        && !work_style.is_empty()
    {
        prompt.push_str(&format!("- work style: {work_style}\n"));
    }
    prompt.push_str(&format!("- intro: {}\n\n", clip(&seeker.intro)));

    prompt.push_str("Project\n");
    prompt.push_str(&format!("- title: {}\n", project.title.trim()));
    prompt.push_str(&format!("- tags: {}\n", join_or_none(&project.tags)));
    if !project.wanted_roles.is_empty() {
        prompt.push_str(&format!(
            "- looking for: {}\n",
            join_or_none(&project.wanted_roles)
        ));
    }
    prompt.push_str(&format!("- intro: {}\n", clip(&project.intro)));

    prompt
}

fn join_or_none(values: &[String]) -> String {
    let cleaned: Vec<&str> = values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();
    if cleaned.is_empty() {
        "none listed".to_string()
    } else {
        cleaned.join(", ")
    }
}

fn clip(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no intro)".to_string();
    }
    if trimmed.chars().count() <= MAX_INTRO_CHARS {
        return trimmed.to_string();
    }
    let mut clipped: String = trimmed.chars().take(MAX_INTRO_CHARS).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectKey, SeekerKey};

    fn seeker() -> SeekerProfile {
        SeekerProfile {
            key: SeekerKey(42),
            display_name: "Mina".to_string(),
            skills: vec!["Rust".to_string(), " ".to_string(), "Postgres".to_string()],
            intro: "Backend engineer who likes storage engines.".to_string(),
            work_style: Some("async, weekends".to_string()),
        }
    }

    fn project() -> ProjectProfile {
        ProjectProfile {
            key: ProjectKey(7),
            title: "Tiny KV".to_string(),
            intro: "A toy key-value store.".to_string(),
            tags: vec!["databases".to_string()],
            wanted_roles: Vec::new(),
        }
    }

    #[test]
    fn seeker_prompt_addresses_collaborator_and_lists_context() {
        let prompt = build_prompt(&seeker(), &project(), Perspective::Seeker);

        assert!(prompt.contains("Address the collaborator directly"));
        assert!(prompt.contains("- skills: Rust, Postgres\n"));
        assert!(prompt.contains("- work style: async, weekends\n"));
        assert!(prompt.contains("- title: Tiny KV\n"));
        assert!(!prompt.contains("looking for"));
    }

    #[test]
    fn owner_prompt_addresses_project_owner() {
        let prompt = build_prompt(&seeker(), &project(), Perspective::Owner);
        assert!(prompt.contains("Address the project owner directly"));
    }

    #[test]
    fn empty_fields_render_placeholders_and_long_intros_are_clipped() {
        let mut seeker = seeker();
        seeker.skills.clear();
        seeker.intro = "x".repeat(MAX_INTRO_CHARS + 50);
        let mut project = project();
        project.intro = "   ".to_string();

        let prompt = build_prompt(&seeker, &project, Perspective::Seeker);

        assert!(prompt.contains("- skills: none listed\n"));
        assert!(prompt.contains(&format!("- intro: {}...\n", "x".repeat(MAX_INTRO_CHARS))));
        assert!(prompt.contains("- intro: (no intro)\n"));
    }
}
