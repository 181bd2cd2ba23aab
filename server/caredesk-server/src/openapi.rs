use axum::Router;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::{Response, ResponseBuilder};
use utoipa::openapi::schema::{Array, ObjectBuilder, Schema, Type};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{Components, ContentBuilder, RefOr, Required};
use utoipa::{Modify, OpenApi, PartialSchema, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::common::Resource;
use crate::handlers::{billing, healthcare, laboratory, patients, pharmacy, users};
use crate::server::CareDeskServer;
use crate::utils::{PAGE_PARAM, PAGE_SIZE_PARAM, SEARCH_PARAM, SORT_PARAM};

/// Main OpenAPI documentation structure
///
/// Resource CRUD paths are generated by [`CrudPaths`].
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health endpoints
        crate::handlers::health::health_check,

        // Authentication endpoints
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::navigation,

        // Resource-specific endpoints
        crate::handlers::healthcare::get_medical_record_by_appointment,
        crate::handlers::billing::record_invoice_payment,
        crate::handlers::reports::report_summary,
    ),
    components(
        schemas(
            crate::error::ApiErrorResponse,
            crate::error::ResponseMetadata,
            crate::error::PaginationInfo,
            crate::handlers::common::crud::DeleteConfirmation,
            crate::handlers::health::HealthResponse,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::LogoutResponse,
            crate::handlers::auth::NavigationResponse,
            crate::handlers::billing::RecordPaymentRequest,
            crate::handlers::billing::PaymentReceipt,
            crate::handlers::reports::ReportSummary,
            crate::auth::Role,
            crate::auth::Page,
        )
    ),
    modifiers(&SecurityAddon, &CrudPaths),
    security(("bearer_auth" = [])),
    tags(
        (name = "health", description = "Service health"),
        (name = "authentication", description = "Staff sign-in, sessions and navigation"),
        (name = "patients", description = "Patient registry"),
        (name = "appointments", description = "Appointment scheduling"),
        (name = "medical-records", description = "Visit records"),
        (name = "billing", description = "Invoices, payments and price lists"),
        (name = "pharmacy", description = "Medicines, stock and prescriptions"),
        (name = "laboratory", description = "Lab orders, results and catalog"),
        (name = "users", description = "Staff accounts"),
        (name = "reports", description = "Dashboard aggregates"),
    ),
    info(
        title = "CareDesk HIMS API",
        description = "Hospital administration API: patients, appointments, medical records, billing, pharmacy and laboratory.",
    ),
)]
pub struct ApiDoc;

/// Registers the bearer token scheme used by every protected route
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Components::new);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Adds the five CRUD operations of every resource
struct CrudPaths;

impl Modify for CrudPaths {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        add_crud_paths::<patients::Patients>(openapi, "patients");
        add_crud_paths::<healthcare::Appointments>(openapi, "appointments");
        add_crud_paths::<healthcare::MedicalRecords>(openapi, "medical-records");

        add_crud_paths::<billing::Invoices>(openapi, "billing");
        add_crud_paths::<billing::InvoiceItems>(openapi, "billing");
        add_crud_paths::<billing::PaymentTransactions>(openapi, "billing");
        add_crud_paths::<billing::ServicePrices>(openapi, "billing");
        add_crud_paths::<billing::InsuranceProviders>(openapi, "billing");

        add_crud_paths::<pharmacy::Medicines>(openapi, "pharmacy");
        add_crud_paths::<pharmacy::Suppliers>(openapi, "pharmacy");
        add_crud_paths::<pharmacy::StockTransactions>(openapi, "pharmacy");
        add_crud_paths::<pharmacy::StockAlerts>(openapi, "pharmacy");
        add_crud_paths::<pharmacy::Prescriptions>(openapi, "pharmacy");

        add_crud_paths::<laboratory::LabTests>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabResults>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabParameters>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabNormalRanges>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabTestTemplates>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabWorkflows>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabEquipmentRegistry>(openapi, "laboratory");
        add_crud_paths::<laboratory::LabQualityControls>(openapi, "laboratory");

        add_crud_paths::<users::Users>(openapi, "users");
    }
}

fn add_crud_paths<R>(openapi: &mut utoipa::openapi::OpenApi, tag: &str)
where
    R: Resource,
    R::Record: ToSchema,
{
    let schema = <R::Record as ToSchema>::name().to_string();
    let components = openapi.components.get_or_insert_with(Components::new);
    components
        .schemas
        .insert(schema.clone(), <R::Record as PartialSchema>::schema());
    let mut nested = Vec::new();
    <R::Record as ToSchema>::schemas(&mut nested);
    components.schemas.extend(nested);

    let collection_path = format!("/{}", R::COLLECTION);
    let record_path = format!("/{}/{{id}}", R::COLLECTION);
    let operation_suffix = R::COLLECTION.replace('-', "_");
    let label = R::LABEL.to_lowercase();

    let record = || RefOr::Ref(utoipa::openapi::Ref::from_schema_name(schema.clone()));
    let records = || RefOr::T(Schema::Array(Array::new(record())));

    let list = OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(format!("list_{operation_suffix}")))
        .summary(Some(format!("List {label} records")))
        .parameter(query_parameter(SEARCH_PARAM, Type::String, "Case-insensitive text search"))
        .parameter(query_parameter(SORT_PARAM, Type::String, "Sort field, prefix with '-' for descending"))
        .parameter(query_parameter(PAGE_PARAM, Type::Integer, "1-based page number"))
        .parameter(query_parameter(PAGE_SIZE_PARAM, Type::Integer, "Page size (1-100, default 20)"))
        .response("200", envelope_response("Matching records", records()))
        .response("400", error_response("Unknown filter or sort field"))
        .build();
    openapi
        .paths
        .add_path_operation(&collection_path, vec![HttpMethod::Get], list);

    let create = OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(format!("create_{operation_suffix}")))
        .summary(Some(format!("Create a {label}")))
        .request_body(Some(json_body(record())))
        .response("201", envelope_response("Created record", record()))
        .response("400", error_response("Validation failed"))
        .response("409", error_response("Duplicate unique value"))
        .build();
    openapi
        .paths
        .add_path_operation(&collection_path, vec![HttpMethod::Post], create);

    let get = OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(format!("get_{operation_suffix}")))
        .summary(Some(format!("Get a {label} by id")))
        .parameter(id_parameter())
        .response("200", envelope_response("Record", record()))
        .response("404", error_response("Not found"))
        .build();
    openapi
        .paths
        .add_path_operation(&record_path, vec![HttpMethod::Get], get);

    let update = OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(format!("update_{operation_suffix}")))
        .summary(Some(format!("Update a {label}")))
        .parameter(id_parameter())
        .request_body(Some(json_body(record())))
        .response("200", envelope_response("Updated record", record()))
        .response("400", error_response("Validation failed"))
        .response("404", error_response("Not found"))
        .build();
    openapi
        .paths
        .add_path_operation(&record_path, vec![HttpMethod::Put], update);

    let delete = OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(format!("delete_{operation_suffix}")))
        .summary(Some(format!("Delete a {label}")))
        .parameter(id_parameter())
        .response(
            "200",
            envelope_response(
                "Deletion confirmation",
                RefOr::Ref(utoipa::openapi::Ref::from_schema_name("DeleteConfirmation")),
            ),
        )
        .response("404", error_response("Not found"))
        .build();
    openapi
        .paths
        .add_path_operation(&record_path, vec![HttpMethod::Delete], delete);
}

fn id_parameter() -> Parameter {
    ParameterBuilder::new()
        .name("id")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .description(Some("Record id"))
        .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
        .build()
}

fn query_parameter(name: &str, schema_type: Type, description: &str) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(ObjectBuilder::new().schema_type(schema_type)))
        .build()
}

fn json_body(schema: RefOr<Schema>) -> utoipa::openapi::request_body::RequestBody {
    RequestBodyBuilder::new()
        .content("application/json", ContentBuilder::new().schema(Some(schema)).build())
        .required(Some(Required::True))
        .build()
}

/// `{success, data, metadata}` wrapper around `data`
fn envelope_response(description: &str, data: RefOr<Schema>) -> RefOr<Response> {
    let envelope = ObjectBuilder::new()
        .property("success", ObjectBuilder::new().schema_type(Type::Boolean))
        .required("success")
        .property("data", data)
        .property(
            "metadata",
            utoipa::openapi::Ref::from_schema_name("ResponseMetadata"),
        )
        .build();
    let response = ResponseBuilder::new()
        .description(description)
        .content(
            "application/json",
            ContentBuilder::new()
                .schema(Some(RefOr::T(Schema::Object(envelope))))
                .build(),
        )
        .build();
    RefOr::T(response)
}

fn error_response(description: &str) -> RefOr<Response> {
    let response = ResponseBuilder::new()
        .description(description)
        .content(
            "application/json",
            ContentBuilder::new()
                .schema(Some(utoipa::openapi::Ref::from_schema_name("ApiErrorResponse")))
                .build(),
        )
        .build();
    RefOr::T(response)
}

/// Create OpenAPI documentation routes
pub fn create_docs_routes() -> Router<CareDeskServer> {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_generated_crud_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/patients"));
        assert!(doc.paths.paths.contains_key("/lab-equipment/{id}"));
        assert!(doc.paths.paths.contains_key("/invoices/{id}/payments"));

        let patients = &doc.paths.paths["/patients"];
        assert!(patients.get.is_some());
        assert!(patients.post.is_some());

        let schemas = &doc.components.as_ref().map(|c| c.schemas.clone()).unwrap_or_default();
        assert!(schemas.contains_key("Patient"));
        assert!(schemas.contains_key("LabQualityControl"));
    }

    #[test]
    fn test_document_declares_bearer_auth() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
