//! HTTP/JSON 后端
//!
//! 通过控制台的 REST 路由实现 `CaseloadBackend`。读取路由按重新分配模式选择：
//! - 仅负责人模式：`GET /bolsas/solicitudes?gestoraId=&fechaInicio=&fechaFin=`，
//!   目录为 `GET /bolsas/solicitudes/gestoras-disponibles`
//! - 按时间段模式：`GET /enfermeria/pacientes/por-enfermera?idPersonal=&fecha=&turno=`，
//!   目录为 `GET /enfermeria/enfermeras`，占用查询也走这条病例路由
//!
//! 提交路由与模式一一对应：`PUT {batch_reassign}` 批量，`PATCH {case_reassign}` 单个。
//! 列表响应可以是数组，也可以是带 `content` 或 `gestoras` 字段的对象。

use crate::config::{AuthenticationConfig, BackendConfig, VariantRoutes};
use async_trait::async_trait;
use caseload_core::utils::{normalize_status_code, parse_clock_time};
use caseload_core::{
    BackendError, CaseId, CaseloadBackend, CaseloadFilter, HandlerId, HandlerSummary,
    OccupiedAppointment, PatientCaseRecord, ReassignmentMode, ReassignmentPlan, Shift,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 病例记录的传输格式，同时接受驼峰和下划线字段名
#[derive(Debug, Deserialize)]
struct CaseRecordDto {
    #[serde(rename = "idSolicitud", alias = "id_solicitud")]
    case_id: CaseId,
    #[serde(rename = "pacienteNombre", alias = "paciente_nombre", default)]
    patient_name: Option<String>,
    #[serde(rename = "pacienteDni", alias = "paciente_dni", default)]
    patient_external_id: Option<String>,
    #[serde(rename = "condicionMedica", alias = "condicion_medica", default)]
    status_code: Option<String>,
    #[serde(rename = "idPersonal", alias = "id_personal", default)]
    handler_id: Option<HandlerId>,
    #[serde(rename = "responsableGestoraId", alias = "responsable_gestora_id", default)]
    gestora_id: Option<HandlerId>,
    #[serde(rename = "horaCita", alias = "hora_cita", default)]
    appointment_time: Option<String>,
}

impl CaseRecordDto {
    fn into_record(self, mode: ReassignmentMode, fallback_handler: HandlerId) -> PatientCaseRecord {
        let handler_id = match mode {
            ReassignmentMode::HandlerOnly => self.gestora_id,
            ReassignmentMode::SlotAware => self.handler_id,
        };
        PatientCaseRecord {
            case_id: self.case_id,
            patient_name: self.patient_name.unwrap_or_default(),
            patient_external_id: self.patient_external_id.unwrap_or_default(),
            // 保留原始代码，分类时再规范化；空白代码视为未设置
            status_code: self
                .status_code
                .filter(|code| normalize_status_code(code).is_some()),
            current_handler_id: handler_id.unwrap_or(fallback_handler),
            appointment_time: self.appointment_time.as_deref().and_then(parse_clock_time),
        }
    }
}

/// 列表响应：数组、分页对象或目录对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Items(Vec<T>),
    Page { content: Vec<T> },
    Handlers { gestoras: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListBody::Items(items) => items,
            ListBody::Page { content } => content,
            ListBody::Handlers { gestoras } => gestoras,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HandlerDto {
    #[serde(rename = "idPersonal", alias = "id_personal", alias = "id")]
    id: HandlerId,
    #[serde(rename = "nombreCompleto", alias = "nombre_completo", default)]
    display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchReassignBody<'a> {
    ids: &'a [CaseId],
    id_personal: HandlerId,
    fecha: String,
    hora: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseReassignBody<'a> {
    gestora_id: HandlerId,
    gestora_nombre: &'a str,
}

fn transport(error: reqwest::Error) -> BackendError {
    BackendError::Transport(error.to_string())
}

/// 基于 reqwest 的后端，读取路由由创建时的模式决定
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
    mode: ReassignmentMode,
}

impl HttpBackend {
    pub fn new(config: BackendConfig, mode: ReassignmentMode) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(transport)?;
        info!("HTTP backend configured for {} ({:?})", config.base_url, mode);
        Ok(Self {
            client,
            config,
            mode,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn mode(&self) -> ReassignmentMode {
        self.mode
    }

    fn routes(&self) -> &VariantRoutes {
        self.config.endpoints.routes(self.mode)
    }

    /// 添加认证头
    fn add_auth_headers(
        request: reqwest::RequestBuilder,
        auth: &AuthenticationConfig,
    ) -> reqwest::RequestBuilder {
        match auth {
            AuthenticationConfig::None => request,
            AuthenticationConfig::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthenticationConfig::ApiKey { key, header } => {
                let header_name = header.as_deref().unwrap_or("X-API-Key");
                request.header(header_name, key)
            }
            AuthenticationConfig::BearerToken { token } => request.bearer_auth(token),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = self.config.url(path);
        debug!("{} {}", method, url);
        Self::add_auth_headers(self.client.request(method, url), &self.config.authentication)
    }

    /// 发送请求并检查状态码，返回响应正文
    async fn send(request: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if status.is_success() {
            Ok(body)
        } else {
            warn!("Backend responded {}: {}", status, body);
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, BackendError> {
        Self::decode::<ListBody<T>>(body).map(ListBody::into_items)
    }

    /// 病例列表的查询参数；管理员路由没有班次参数，按日期区间查询
    fn caseload_query(
        mode: ReassignmentMode,
        routes: &VariantRoutes,
        handler_id: HandlerId,
        date: Option<NaiveDate>,
        shift: Option<Shift>,
    ) -> Vec<(String, String)> {
        let mut query = vec![(routes.handler_param.clone(), handler_id.to_string())];
        let day = date.map(|date| date.format("%Y-%m-%d").to_string());
        match mode {
            ReassignmentMode::HandlerOnly => {
                if let Some(day) = day {
                    query.push(("fechaInicio".to_string(), day.clone()));
                    query.push(("fechaFin".to_string(), day));
                }
            }
            ReassignmentMode::SlotAware => {
                if let Some(day) = day {
                    query.push(("fecha".to_string(), day));
                }
                if let Some(shift) = shift {
                    query.push(("turno".to_string(), shift.as_param().to_string()));
                }
            }
        }
        query
    }

    async fn get_records(
        &self,
        routes: &VariantRoutes,
        query: Vec<(String, String)>,
    ) -> Result<Vec<CaseRecordDto>, BackendError> {
        let request = self
            .request(reqwest::Method::GET, &routes.caseload)
            .query(&query);
        let body = Self::send(request).await?;
        Self::decode_list(&body)
    }
}

#[async_trait]
impl CaseloadBackend for HttpBackend {
    async fn fetch_caseload(
        &self,
        filter: &CaseloadFilter,
    ) -> Result<Vec<PatientCaseRecord>, BackendError> {
        let routes = self.routes();
        let query = Self::caseload_query(
            self.mode,
            routes,
            filter.handler_id,
            filter.date,
            filter.shift,
        );
        let mut records: Vec<PatientCaseRecord> = self
            .get_records(routes, query)
            .await?
            .into_iter()
            .map(|dto| dto.into_record(self.mode, filter.handler_id))
            .collect();

        // 管理员路由不支持班次，在本地按预约时间过滤
        if let (ReassignmentMode::HandlerOnly, Some(shift)) = (self.mode, filter.shift) {
            records.retain(|record| record.appointment_time.is_some_and(|t| shift.contains(t)));
        }

        info!(
            "Fetched {} cases for handler {}",
            records.len(),
            filter.handler_id
        );
        Ok(records)
    }

    async fn fetch_handler_directory(
        &self,
        exclude: Option<HandlerId>,
    ) -> Result<Vec<HandlerSummary>, BackendError> {
        let request = self.request(reqwest::Method::GET, &self.routes().handler_directory);
        let body = Self::send(request).await?;
        let handlers: Vec<HandlerDto> = Self::decode_list(&body)?;

        Ok(handlers
            .into_iter()
            .filter(|handler| Some(handler.id) != exclude)
            .map(|handler| HandlerSummary {
                id: handler.id,
                display_name: handler.display_name,
            })
            .collect())
    }

    async fn fetch_occupied_appointments(
        &self,
        handler_id: HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<OccupiedAppointment>, BackendError> {
        let routes = &self.config.endpoints.slot_aware;
        let query = Self::caseload_query(
            ReassignmentMode::SlotAware,
            routes,
            handler_id,
            Some(date),
            None,
        );
        let appointments = self
            .get_records(routes, query)
            .await?
            .into_iter()
            .map(|dto| OccupiedAppointment {
                case_id: Some(dto.case_id),
                appointment_time: dto.appointment_time.as_deref().and_then(parse_clock_time),
            })
            .collect();
        Ok(appointments)
    }

    async fn commit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), BackendError> {
        let (Some(date), Some(slot)) = (plan.destination_date, plan.destination_slot) else {
            return Err(BackendError::Rejected(
                "batch reassignment requires a destination date and slot".to_string(),
            ));
        };

        let body = BatchReassignBody {
            ids: &plan.case_ids,
            id_personal: plan.destination.id,
            fecha: date.format("%Y-%m-%d").to_string(),
            hora: slot.to_string(),
        };
        let request = self
            .request(reqwest::Method::PUT, &self.config.endpoints.batch_reassign)
            .json(&body);
        Self::send(request).await?;

        info!(
            "Moved {} cases to handler {} at {} {}",
            plan.case_ids.len(),
            plan.destination.id,
            body.fecha,
            body.hora
        );
        Ok(())
    }

    async fn commit_reassignment_one(
        &self,
        case_id: CaseId,
        destination: &HandlerSummary,
    ) -> Result<(), BackendError> {
        let path = self.config.endpoints.case_reassign_path(case_id);
        let body = CaseReassignBody {
            gestora_id: destination.id,
            gestora_nombre: &destination.display_name,
        };
        let request = self.request(reqwest::Method::PATCH, &path).json(&body);
        Self::send(request).await?;
        debug!("Case {} assigned to handler {}", case_id, destination.id);
        Ok(())
    }
}
