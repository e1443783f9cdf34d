use super::JobContext;

/// Instruction describing the structure of the tailored resume.
pub const SYSTEM_PROMPT: &str = "\
You are an expert resume writer. Rewrite the candidate's resume so it targets \
the job described by the user. Keep every fact truthful: do not invent \
employers, dates, degrees or skills that the resume does not support.

Structure the result as plain text with these sections, in order:
1. Profile Summary: three to four sentences aimed at the target role.
2. Skills: the candidate's most relevant skills first.
3. Experience: each position with title, employer, dates and achievement bullets.
4. Education
5. Certifications: omit this section if the resume lists none.

Keep the candidate's name and contact details at the top. Respond with the \
resume only, without commentary.";

/// Builds the user instruction. Context fields that are absent or blank are
/// left out entirely.
pub fn build_user_prompt(resume_text: &str, context: &JobContext) -> String {
    let mut prompt = String::from("Tailor the following resume");

    let mut target = Vec::new();
    if let Some(title) = context.job_title() {
        target.push(format!("Job title: {}", title));
    }
    if let Some(company) = context.company_name() {
        target.push(format!("Company: {}", company));
    }
    if let Some(description) = context.job_description() {
        target.push(format!("Job description:\n{}", description));
    }

    if target.is_empty() {
        prompt.push_str(" for a general application.\n\n");
    } else {
        prompt.push_str(" for this position.\n\n");
        prompt.push_str(&target.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Resume:\n");
    prompt.push_str(resume_text);
    prompt
}
