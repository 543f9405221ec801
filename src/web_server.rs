use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::{ProblemConfig, ServerConfig};
use crate::judge::Judge;
use crate::routes::{
    custom_handler, evaluate_handler, json_error_handler, query_error_handler, starter_handler,
};

pub fn build_server(
    server_config: ServerConfig,
    problems: Vec<ProblemConfig>,
    judge: Judge,
) -> std::io::Result<Server> {
    let problems = web::Data::new(problems);
    let judge = web::Data::new(judge);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(problems.clone())
            .app_data(judge.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .service(evaluate_handler)
            .service(custom_handler)
            .service(starter_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
