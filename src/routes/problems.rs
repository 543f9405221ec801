use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{not_found, run_error_response};
use crate::config::ProblemConfig;
use crate::judge::{Judge, RunError, TestStatus};
use crate::language::Language;

#[derive(Deserialize, Debug)]
pub struct Submission {
    pub language: String,
    pub source_code: String,
}

#[derive(Deserialize, Debug)]
pub struct CustomSubmission {
    pub language: String,
    pub source_code: String,
    pub inputs: Vec<Value>,
}

#[derive(Deserialize, Debug)]
pub struct StarterQuery {
    pub language: String,
}

#[derive(Serialize, Debug)]
pub struct StarterCode {
    pub language: Language,
    pub code: String,
}

/// Looks up the problem and the submission language, or builds the 404 response
fn resolve<'a>(
    problems: &'a [ProblemConfig],
    id: u32,
    language: &str,
) -> Result<(&'a ProblemConfig, Language), HttpResponse> {
    let problem = problems
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| not_found(format!("problem {id} not found")))?;
    let language = language
        .parse::<Language>()
        .map_err(|e| not_found(e.to_string()))?;
    Ok((problem, language))
}

#[post("/problems/{id}/evaluate")]
pub async fn evaluate_handler(
    judge: web::Data<Judge>,
    problems: web::Data<Vec<ProblemConfig>>,
    path: web::Path<u32>,
    body: web::Json<Submission>,
) -> impl Responder {
    let id = path.into_inner();
    let (problem, language) = match resolve(&problems, id, &body.language) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(schema) = problem.schema.as_ref() else {
        return run_error_response(&RunError::MissingSchema);
    };

    match judge
        .evaluate(schema, language, &body.source_code, &problem.test_cases)
        .await
    {
        Ok(results) => {
            log::info!(
                "Problem {id}: {} of {} test case(s) passed",
                results
                    .iter()
                    .filter(|r| r.status == TestStatus::Pass)
                    .count(),
                results.len()
            );
            HttpResponse::Ok().json(results)
        }
        Err(e) => run_error_response(&e),
    }
}

#[post("/problems/{id}/custom")]
pub async fn custom_handler(
    judge: web::Data<Judge>,
    problems: web::Data<Vec<ProblemConfig>>,
    path: web::Path<u32>,
    body: web::Json<CustomSubmission>,
) -> impl Responder {
    let id = path.into_inner();
    let (problem, language) = match resolve(&problems, id, &body.language) {
        Ok(found) => found,
        Err(response) => return response,
    };

    match judge
        .evaluate_custom(
            problem.schema.as_ref(),
            language,
            &body.source_code,
            problem.reference_solution.as_ref(),
            &body.inputs,
        )
        .await
    {
        Ok(results) => HttpResponse::Ok().json(results),
        Err(e) => run_error_response(&e),
    }
}

#[get("/problems/{id}/starter")]
pub async fn starter_handler(
    problems: web::Data<Vec<ProblemConfig>>,
    path: web::Path<u32>,
    query: web::Query<StarterQuery>,
) -> impl Responder {
    let id = path.into_inner();
    let (problem, language) = match resolve(&problems, id, &query.language) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(schema) = problem.schema.as_ref() else {
        return run_error_response(&RunError::MissingSchema);
    };
    if let Err(e) = schema.validate() {
        return run_error_response(&RunError::InvalidSchema(e));
    }

    HttpResponse::Ok().json(StarterCode {
        language,
        code: language.generator().generate_starter_code(schema),
    })
}
