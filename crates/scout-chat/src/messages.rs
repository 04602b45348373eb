//! User-facing response text.

pub fn need_entity() -> String {
    "Which target should I analyze? Mention a gene or protein symbol, for example IL17RA or EGFR."
        .to_string()
}

pub fn confirm(entity: &str, confidence: f32, low_confidence_threshold: f32) -> String {
    let mut message = format!(
        "Found target {entity}. Run the full assessment (literature, clinical trials, patents, market)?\n\
         Reply \"confirm\" to start, or name another target."
    );
    if confidence < low_confidence_threshold {
        message.push_str(&format!(
            "\nDetection confidence is {:.0}%; please re-enter the name if this is wrong.",
            confidence * 100.0
        ));
    }
    message
}

pub fn reprompt(entity: &str) -> String {
    format!("Analyze {entity}? Reply \"confirm\" to start, \"cancel\" to stop, or name another target.")
}

pub fn multiple_entities(candidates: &[String]) -> String {
    format!(
        "You mentioned several targets: {}. Which one should I analyze?",
        candidates.join(", ")
    )
}

pub fn cancelled() -> String {
    "Analysis cancelled. Name another target whenever you are ready.".to_string()
}

pub fn analyzing(entity: &str, job_id: &str) -> String {
    format!(
        "Started the assessment of {entity} (job {job_id}). This takes a few minutes; \
         send any message to check progress."
    )
}

pub fn in_progress(entity: &str, elapsed_secs: u64) -> String {
    format!("Still analyzing {entity} ({elapsed_secs}s elapsed).")
}

pub fn completed(entity: &str, result_ref: &str) -> String {
    format!("The assessment of {entity} is complete. Report: {result_ref}")
}

pub fn cached_result(entity: &str, result_ref: &str) -> String {
    format!(
        "{entity} was already analyzed this month. Report: {result_ref}\n\
         Say \"force refresh\" to run it again."
    )
}

pub fn failed(entity: &str, errors: &[String]) -> String {
    format!(
        "The assessment of {entity} failed: {}.\nSend any message to start over, or name the target again to retry.",
        join_errors(errors)
    )
}

pub fn timed_out(entity: &str, errors: &[String]) -> String {
    format!(
        "The assessment of {entity} ran out of time: {}.\nName the target again to retry.",
        join_errors(errors)
    )
}

pub fn launch_failed(entity: &str, error: &str) -> String {
    format!("Could not start the assessment of {entity}: {error}. Please try again.")
}

pub fn job_missing(job_id: &str) -> String {
    format!("Job {job_id} is no longer tracked. Name the target again to rerun it.")
}

pub fn entities_listed(entities: &[String]) -> String {
    if entities.is_empty() {
        "No targets have come up in this conversation yet.".to_string()
    } else {
        format!("Targets discussed so far: {}.", entities.join(", "))
    }
}

fn join_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        "unknown error".to_string()
    } else {
        errors.join("; ")
    }
}
