//! Backend operation catalogue.
//!
//! Each [`Operation`] names a GraphQL document and the field under `data`
//! that carries its result.

/// One GraphQL operation.
#[derive(Debug, PartialEq, Eq)]
pub struct Operation {
    /// `operationName` sent with the request.
    pub name: &'static str,
    /// Field of `data` holding the result.
    pub field: &'static str,
    pub document: &'static str,
}

macro_rules! dispatch_fields {
    () => {
        "id status patientLat patientLon patientAddress description severity \
         ambulance { id plate location { lat lon } } hospitalId etaMinutes \
         cancelReason createdAt updatedAt"
    };
}

macro_rules! personal_fields {
    () => {
        "id firstName lastName role status phone email ambulanceId shift"
    };
}

macro_rules! incident_fields {
    () => {
        "id status priority description reporterName reporterPhone address lat lon \
         analysis { severityScore severityLevel recommendedHospitalId summary } \
         analyzedAt rejectionReason createdAt updatedAt"
    };
}

// Dispatch

pub static DISPATCHES: Operation = Operation {
    name: "Dispatches",
    field: "dispatches",
    document: concat!(
        "query Dispatches($filters: DispatchFilters, $limit: Int) { dispatches(filters: $filters, limit: $limit) { ",
        dispatch_fields!(),
        " } }"
    ),
};

pub static DISPATCH: Operation = Operation {
    name: "Dispatch",
    field: "dispatch",
    document: concat!(
        "query Dispatch($id: ID!) { dispatch(id: $id) { ",
        dispatch_fields!(),
        " } }"
    ),
};

pub static CREATE_DISPATCH: Operation = Operation {
    name: "CreateDispatch",
    field: "createDispatch",
    document: concat!(
        "mutation CreateDispatch($input: CreateDispatchInput!) { createDispatch(input: $input) { ",
        dispatch_fields!(),
        " } }"
    ),
};

pub static UPDATE_DISPATCH_STATUS: Operation = Operation {
    name: "UpdateDispatchStatus",
    field: "updateDispatchStatus",
    document: concat!(
        "mutation UpdateDispatchStatus($id: ID!, $status: DispatchStatus!) { updateDispatchStatus(id: $id, status: $status) { ",
        dispatch_fields!(),
        " } }"
    ),
};

pub static COMPLETE_DISPATCH: Operation = Operation {
    name: "CompleteDispatch",
    field: "completeDispatch",
    document: concat!(
        "mutation CompleteDispatch($id: ID!) { completeDispatch(id: $id) { ",
        dispatch_fields!(),
        " } }"
    ),
};

pub static SUBMIT_DISPATCH_FEEDBACK: Operation = Operation {
    name: "SubmitDispatchFeedback",
    field: "submitDispatchFeedback",
    document: "mutation SubmitDispatchFeedback($id: ID!, $feedback: DispatchFeedbackInput!) { submitDispatchFeedback(id: $id, feedback: $feedback) }",
};

pub static CANCEL_DISPATCH: Operation = Operation {
    name: "CancelDispatch",
    field: "cancelDispatch",
    document: concat!(
        "mutation CancelDispatch($id: ID!, $reason: String!) { cancelDispatch(id: $id, reason: $reason) { ",
        dispatch_fields!(),
        " } }"
    ),
};

// Personnel

pub static PERSONNEL: Operation = Operation {
    name: "Personnel",
    field: "personal",
    document: concat!(
        "query Personnel($filters: PersonalFilters) { personal(filters: $filters) { ",
        personal_fields!(),
        " } }"
    ),
};

pub static PERSONAL: Operation = Operation {
    name: "Personal",
    field: "personalById",
    document: concat!(
        "query Personal($id: ID!) { personalById(id: $id) { ",
        personal_fields!(),
        " } }"
    ),
};

pub static CREATE_PERSONAL: Operation = Operation {
    name: "CreatePersonal",
    field: "createPersonal",
    document: concat!(
        "mutation CreatePersonal($input: CreatePersonalInput!) { createPersonal(input: $input) { ",
        personal_fields!(),
        " } }"
    ),
};

pub static UPDATE_PERSONAL: Operation = Operation {
    name: "UpdatePersonal",
    field: "updatePersonal",
    document: concat!(
        "mutation UpdatePersonal($id: ID!, $input: UpdatePersonalInput!) { updatePersonal(id: $id, input: $input) { ",
        personal_fields!(),
        " } }"
    ),
};

pub static CHANGE_PERSONAL_STATUS: Operation = Operation {
    name: "ChangePersonalStatus",
    field: "changePersonalStatus",
    document: concat!(
        "mutation ChangePersonalStatus($id: ID!, $status: PersonalStatus!, $reason: String) { changePersonalStatus(id: $id, status: $status, reason: $reason) { ",
        personal_fields!(),
        " } }"
    ),
};

pub static DELETE_PERSONAL: Operation = Operation {
    name: "DeletePersonal",
    field: "deletePersonal",
    document: "mutation DeletePersonal($id: ID!) { deletePersonal(id: $id) }",
};

// Incidents

pub static INCIDENTS: Operation = Operation {
    name: "Incidents",
    field: "incidents",
    document: concat!(
        "query Incidents($filters: IncidentFilters, $limit: Int, $offset: Int) { incidents(filters: $filters, limit: $limit, offset: $offset) { total items { ",
        incident_fields!(),
        " } } }"
    ),
};

pub static INCIDENT: Operation = Operation {
    name: "Incident",
    field: "incident",
    document: concat!(
        "query Incident($id: ID!) { incident(id: $id) { ",
        incident_fields!(),
        " } }"
    ),
};

pub static CREATE_INCIDENT: Operation = Operation {
    name: "CreateIncident",
    field: "createIncident",
    document: concat!(
        "mutation CreateIncident($input: CreateIncidentInput!) { createIncident(input: $input) { ",
        incident_fields!(),
        " } }"
    ),
};

pub static UPDATE_INCIDENT_STATUS: Operation = Operation {
    name: "UpdateIncidentStatus",
    field: "updateIncidentStatus",
    document: concat!(
        "mutation UpdateIncidentStatus($id: ID!, $status: IncidentStatus!, $reason: String) { updateIncidentStatus(id: $id, status: $status, reason: $reason) { ",
        incident_fields!(),
        " } }"
    ),
};

pub static APPROVE_INCIDENT: Operation = Operation {
    name: "ApproveIncident",
    field: "approveIncident",
    document: concat!(
        "mutation ApproveIncident($id: ID!) { approveIncident(id: $id) { ",
        incident_fields!(),
        " } }"
    ),
};

pub static REJECT_INCIDENT: Operation = Operation {
    name: "RejectIncident",
    field: "rejectIncident",
    document: concat!(
        "mutation RejectIncident($id: ID!, $reason: String!) { rejectIncident(id: $id, reason: $reason) { ",
        incident_fields!(),
        " } }"
    ),
};

pub static REQUEST_INCIDENT_ANALYSIS: Operation = Operation {
    name: "RequestIncidentAnalysis",
    field: "requestIncidentAnalysis",
    document: "mutation RequestIncidentAnalysis($id: ID!) { requestIncidentAnalysis(id: $id) }",
};

pub static CHANGE_INCIDENT_PRIORITY: Operation = Operation {
    name: "ChangeIncidentPriority",
    field: "changeIncidentPriority",
    document: concat!(
        "mutation ChangeIncidentPriority($id: ID!, $priority: IncidentPriority!) { changeIncidentPriority(id: $id, priority: $priority) { ",
        incident_fields!(),
        " } }"
    ),
};

// Auth and clinical support

pub static LOGIN: Operation = Operation {
    name: "Login",
    field: "login",
    document: "mutation Login($username: String!, $password: String!) { login(username: $username, password: $password) { accessToken tokenType expiresIn user { id username fullName email role } } }",
};

pub static ASSESS_PATIENT: Operation = Operation {
    name: "AssessPatient",
    field: "assessPatient",
    document: "query AssessPatient($input: ClinicalInput!) { assessPatient(input: $input) { severityScore severityLevel recommendations { hospitalId name distanceKm etaMinutes availableBeds score } } }",
};

/// Every operation, for startup logging and tests.
pub static ALL: [&Operation; 23] = [
    &DISPATCHES,
    &DISPATCH,
    &CREATE_DISPATCH,
    &UPDATE_DISPATCH_STATUS,
    &COMPLETE_DISPATCH,
    &SUBMIT_DISPATCH_FEEDBACK,
    &CANCEL_DISPATCH,
    &PERSONNEL,
    &PERSONAL,
    &CREATE_PERSONAL,
    &UPDATE_PERSONAL,
    &CHANGE_PERSONAL_STATUS,
    &DELETE_PERSONAL,
    &INCIDENTS,
    &INCIDENT,
    &CREATE_INCIDENT,
    &UPDATE_INCIDENT_STATUS,
    &APPROVE_INCIDENT,
    &REJECT_INCIDENT,
    &REQUEST_INCIDENT_ANALYSIS,
    &CHANGE_INCIDENT_PRIORITY,
    &LOGIN,
    &ASSESS_PATIENT,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = ALL.iter().map(|op| op.name).collect();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn test_document_declares_name_and_field() {
        for op in ALL {
            assert!(
                op.document.contains(&format!(" {}(", op.name))
                    || op.document.contains(&format!(" {} {{", op.name)),
                "{} document does not declare its name",
                op.name
            );
            assert!(
                op.document.contains(&format!("{{ {}", op.field)),
                "{} document does not select {}",
                op.name,
                op.field
            );
        }
    }
}
