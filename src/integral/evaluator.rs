//! Assembly of fracture integrals over the integration domain.
//!
//! The computation is split the same way as finite element assembly: an
//! element-local assembler computes the contribution of a single element to
//! the integral of every crack front point, and a driver sums the
//! contributions over all elements, serially or in parallel. The evaluator
//! ties the pieces together and turns accumulated totals into reported
//! fracture parameters.

use std::cell::RefCell;

use eyre::eyre;
use log::debug;
use nalgebra::{DVector, Scalar, Vector3};
use numeric_literals::replace_float_literals;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use thread_local::ThreadLocal;

use crate::front::CrackFront;
use crate::integral::auxiliary::auxiliary_field;
use crate::integral::{
    ElasticModuli, FractureIntegralKind, FractureReport, FrontParameterization, IntegrationDomain,
    QuadratureFields,
};
use crate::qfunction::QFunction;
use crate::workspace::{define_thread_local_workspace, with_thread_local_workspace};
use crate::Real;

/// Element-local assembler for integrals accumulated per crack front point.
///
/// [`assemble_element_integrals`](Self::assemble_element_integrals)
/// overwrites `output` with the contribution of a single element to every
/// front point. Summing contributions across elements is the concern of
/// drivers such as [`DomainSumAssembler`] and [`DomainSumParAssembler`],
/// which makes it possible to distribute the element loop over partitions
/// and sum the partial totals afterwards.
pub trait ElementIntegralAssembler<T: Real> {
    fn num_elements(&self) -> usize;

    fn num_front_points(&self) -> usize;

    /// Computes the contribution of the given element, one entry per crack
    /// front point. `output` must have length
    /// [`num_front_points`](Self::num_front_points).
    fn assemble_element_integrals(&self, output: &mut [T], element_index: usize)
        -> eyre::Result<()>;
}

/// Computes per-element contributions to a fracture integral along a crack
/// front.
///
/// For each front point, the q function's nodal weights are interpolated
/// with the shape functions of the integration domain, and the domain form
/// of the integral is evaluated with the quadrature rule of each element.
#[derive(Debug, Clone)]
pub struct DomainIntegralAssembler<'a, T: Scalar, Domain, Fields, Q> {
    front: &'a CrackFront<T>,
    domain: &'a Domain,
    fields: &'a Fields,
    q_function: &'a Q,
    kind: FractureIntegralKind<T>,
    moduli: ElasticModuli<T>,
}

struct IntegralWorkspace<T> {
    element_nodes: Vec<usize>,
    nodal_weights: Vec<T>,
}

impl<T> Default for IntegralWorkspace<T> {
    fn default() -> Self {
        Self {
            element_nodes: Vec::new(),
            nodal_weights: Vec::new(),
        }
    }
}

define_thread_local_workspace!(INTEGRAL_WORKSPACE);

impl<'a, T, Domain, Fields, Q> ElementIntegralAssembler<T>
    for DomainIntegralAssembler<'a, T, Domain, Fields, Q>
where
    T: Real,
    Domain: IntegrationDomain<T>,
    Fields: QuadratureFields<T>,
    Q: QFunction<T>,
{
    fn num_elements(&self) -> usize {
        self.domain.num_elements()
    }

    fn num_front_points(&self) -> usize {
        self.front.num_points()
    }

    fn assemble_element_integrals(
        &self,
        output: &mut [T],
        element_index: usize,
    ) -> eyre::Result<()> {
        if output.len() != self.front.num_points() {
            return Err(eyre!(
                "output slice has {} entries, expected one per crack front point ({})",
                output.len(),
                self.front.num_points()
            ));
        }
        output.fill(T::zero());
        with_thread_local_workspace(
            &INTEGRAL_WORKSPACE,
            |workspace: &mut IntegralWorkspace<T>| {
                self.assemble_element_integrals_with_workspace(output, element_index, workspace)
            },
        )
    }
}

impl<'a, T, Domain, Fields, Q> DomainIntegralAssembler<'a, T, Domain, Fields, Q>
where
    T: Real,
    Domain: IntegrationDomain<T>,
    Fields: QuadratureFields<T>,
    Q: QFunction<T>,
{
    fn assemble_element_integrals_with_workspace(
        &self,
        output: &mut [T],
        element_index: usize,
        workspace: &mut IntegralWorkspace<T>,
    ) -> eyre::Result<()> {
        let node_count = self.domain.element_node_count(element_index);
        workspace.element_nodes.resize(node_count, usize::MAX);
        self.domain
            .populate_element_nodes(&mut workspace.element_nodes, element_index);
        workspace.nodal_weights.resize(node_count, T::zero());

        for point_index in 0..self.front.num_points() {
            // The q function vanishes outside a neighborhood of the front
            // point, so most elements contribute to only a few points.
            let mut any_support = false;
            for local_node in 0..node_count {
                let node_index = workspace.element_nodes[local_node];
                let node_position = self.domain.node_position(node_index);
                let weight = self
                    .q_function
                    .node_weight(point_index, node_index, &node_position);
                if weight != T::zero() {
                    any_support = true;
                }
                workspace.nodal_weights[local_node] = weight;
            }
            if !any_support {
                continue;
            }

            let mut total = T::zero();
            for quadrature_index in 0..self.domain.num_quadrature_points(element_index) {
                let mut q = T::zero();
                let mut q_gradient = Vector3::zeros();
                for (local_node, &weight) in workspace.nodal_weights.iter().enumerate() {
                    if weight != T::zero() {
                        q += self.domain.shape_value(element_index, local_node, quadrature_index)
                            * weight;
                        q_gradient += self.domain.shape_gradient(
                            element_index,
                            local_node,
                            quadrature_index,
                        ) * weight;
                    }
                }
                let integrand = self.quadrature_point_integrand(
                    point_index,
                    element_index,
                    quadrature_index,
                    q,
                    &q_gradient,
                );
                total += integrand
                    * self.domain.jacobian_weight(element_index, quadrature_index)
                    * self.domain.coordinate_factor(element_index, quadrature_index);
            }
            output[point_index] = total;
        }
        Ok(())
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn quadrature_point_integrand(
        &self,
        point_index: usize,
        element_index: usize,
        quadrature_index: usize,
        q: T,
        q_gradient: &Vector3<T>,
    ) -> T {
        let gradient_cf = self.front.rotate_to_local(q_gradient, point_index);
        let stress = self.fields.stress(element_index, quadrature_index);
        let displacement_gradient = self.fields.displacement_gradient(element_index, quadrature_index);
        let displacement_gradient_cf = self
            .front
            .rotate_tensor_to_local(&displacement_gradient, point_index);
        let du_dx1_cf = displacement_gradient_cf.column(0).into_owned();

        match self.kind {
            FractureIntegralKind::J { .. } => {
                let stress_cf = self.front.rotate_tensor_to_local(&stress, point_index);
                let strain = self.fields.strain(element_index, quadrature_index);
                // The strain energy density is frame invariant, so the
                // contraction can stay in global coordinates.
                let energy_density = 0.5 * stress.dot(&strain);
                let mut integrand =
                    gradient_cf.dot(&(stress_cf * du_dx1_cf)) - energy_density * gradient_cf[0];
                if let (Some(temperature_gradient), Some(eigenstrain_derivative)) = (
                    self.fields
                        .temperature_gradient(element_index, quadrature_index),
                    self.fields
                        .eigenstrain_temperature_derivative(element_index, quadrature_index),
                ) {
                    let temperature_gradient_cf = self
                        .front
                        .rotate_to_local(&temperature_gradient, point_index);
                    integrand +=
                        q * stress.dot(&eigenstrain_derivative) * temperature_gradient_cf[0];
                }
                integrand
            }
            FractureIntegralKind::Interaction { mode, .. } => {
                let quadrature_point = self.domain.quadrature_point(element_index, quadrature_index);
                let polar = self.front.polar_coordinates(&quadrature_point, point_index);
                let auxiliary = auxiliary_field(mode, &polar, &self.moduli);
                let stress_cf = self.front.rotate_tensor_to_local(&stress, point_index);
                let strain_cf = self.front.rotate_tensor_to_local(
                    &self.fields.strain(element_index, quadrature_index),
                    point_index,
                );

                let actual_on_auxiliary =
                    gradient_cf.dot(&(stress_cf * auxiliary.displacement_gradient_x1));
                let auxiliary_on_actual = gradient_cf.dot(&(auxiliary.stress * du_dx1_cf));
                let interaction_work = auxiliary.stress.dot(&strain_cf);
                actual_on_auxiliary + auxiliary_on_actual - interaction_work * gradient_cf[0]
            }
        }
    }
}

/// A serial driver that sums per-element contributions into per-front-point
/// totals.
#[derive(Debug)]
pub struct DomainSumAssembler<T> {
    // Buffer for per-element contributions, kept across calls to avoid
    // reallocation.
    workspace: RefCell<Vec<T>>,
}

impl<T> Default for DomainSumAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(Vec::new()),
        }
    }
}

impl<T: Real> DomainSumAssembler<T> {
    pub fn assemble(
        &self,
        element_assembler: &impl ElementIntegralAssembler<T>,
    ) -> eyre::Result<DVector<T>> {
        let mut totals = DVector::zeros(element_assembler.num_front_points());
        self.assemble_into(&mut totals, element_assembler)?;
        Ok(totals)
    }

    pub fn assemble_into(
        &self,
        totals: &mut DVector<T>,
        element_assembler: &impl ElementIntegralAssembler<T>,
    ) -> eyre::Result<()> {
        let num_front_points = element_assembler.num_front_points();
        if totals.len() != num_front_points {
            return Err(eyre!(
                "accumulator has {} entries, expected one per crack front point ({})",
                totals.len(),
                num_front_points
            ));
        }
        let mut buffer = self.workspace.borrow_mut();
        buffer.resize(num_front_points, T::zero());
        for element_index in 0..element_assembler.num_elements() {
            element_assembler.assemble_element_integrals(&mut buffer[..], element_index)?;
            for (total, contribution) in totals.iter_mut().zip(buffer.iter()) {
                *total += *contribution;
            }
        }
        Ok(())
    }
}

/// A parallel driver that distributes the element loop with `rayon`,
/// accumulating into one set of totals per worker thread.
#[derive(Debug, Default)]
pub struct DomainSumParAssembler;

struct ParAssemblerWorkspace<T: Scalar> {
    buffer: Vec<T>,
    totals: DVector<T>,
}

impl DomainSumParAssembler {
    pub fn assemble<T, Assembler>(&self, element_assembler: &Assembler) -> eyre::Result<DVector<T>>
    where
        T: Real + Send + Sync,
        Assembler: ElementIntegralAssembler<T> + Sync,
    {
        let num_front_points = element_assembler.num_front_points();
        let workers: ThreadLocal<RefCell<ParAssemblerWorkspace<T>>> = ThreadLocal::new();

        (0..element_assembler.num_elements())
            .into_par_iter()
            .try_for_each(|element_index| {
                let mut workspace = workers
                    .get_or(|| {
                        RefCell::new(ParAssemblerWorkspace {
                            buffer: Vec::new(),
                            totals: DVector::zeros(num_front_points),
                        })
                    })
                    .borrow_mut();
                let workspace = &mut *workspace;
                workspace.buffer.resize(num_front_points, T::zero());
                element_assembler
                    .assemble_element_integrals(&mut workspace.buffer[..], element_index)?;
                for (total, contribution) in
                    workspace.totals.iter_mut().zip(workspace.buffer.iter())
                {
                    *total += *contribution;
                }
                Ok::<(), eyre::Report>(())
            })?;

        let mut totals = DVector::zeros(num_front_points);
        for workspace in workers.into_iter() {
            totals += workspace.into_inner().totals;
        }
        Ok(totals)
    }
}

/// Evaluates a fracture integral along a crack front and reports one value
/// per front point.
///
/// Construct with [`FractureIntegralEvaluatorBuilder`].
#[derive(Debug, Clone)]
pub struct FractureIntegralEvaluator<'a, T: Scalar, Domain, Fields, Q> {
    assembler: DomainIntegralAssembler<'a, T, Domain, Fields, Q>,
}

impl<'a, T, Domain, Fields, Q> FractureIntegralEvaluator<'a, T, Domain, Fields, Q>
where
    T: Real,
    Domain: IntegrationDomain<T>,
    Fields: QuadratureFields<T>,
    Q: QFunction<T>,
{
    /// The element-local assembler backing this evaluator.
    ///
    /// Exposed so that callers which partition the domain themselves can
    /// drive the element loop, sum partial totals across partitions, and
    /// pass the result to [`finalize`](Self::finalize).
    pub fn element_assembler(&self) -> &DomainIntegralAssembler<'a, T, Domain, Fields, Q> {
        &self.assembler
    }

    /// Accumulates the integral over all elements and finalizes the report.
    pub fn evaluate(&self) -> eyre::Result<FractureReport<T>> {
        let totals = DomainSumAssembler::default().assemble(&self.assembler)?;
        self.finalize(totals)
    }

    /// Like [`evaluate`](Self::evaluate), but distributes the element loop
    /// over the rayon thread pool. Agrees with the serial result up to the
    /// summation order of floating point contributions.
    pub fn evaluate_par(&self) -> eyre::Result<FractureReport<T>>
    where
        T: Send + Sync,
        Domain: Sync,
        Fields: Sync,
        Q: Sync,
    {
        let totals = DomainSumParAssembler::default().assemble(&self.assembler)?;
        self.finalize(totals)
    }

    /// Turns accumulated per-front-point totals into reported fracture
    /// parameters.
    ///
    /// Applies the symmetry factor, normalizes by the average adjacent
    /// segment length (unless the front is treated as 2D) and converts to a
    /// stress intensity factor if the integral kind requests it.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn finalize(&self, mut totals: DVector<T>) -> eyre::Result<FractureReport<T>> {
        let front = self.assembler.front;
        if totals.len() != front.num_points() {
            return Err(eyre!(
                "accumulator has {} entries, expected one per crack front point ({})",
                totals.len(),
                front.num_points()
            ));
        }

        for (point_index, total) in totals.iter_mut().enumerate() {
            let point = front.point(point_index);
            if front.symmetry_plane().is_some() {
                // Only half of the structure is meshed, so the domain
                // integral picks up half of the released energy.
                *total *= 2.0;
            }
            if !front.treat_as_2d() {
                let average_segment =
                    0.5 * (point.backward_segment_length + point.forward_segment_length);
                if average_segment <= T::zero() {
                    return Err(eyre!(
                        "crack front point {} has a zero average segment length",
                        point_index
                    ));
                }
                *total /= average_segment;
            }
            *total = match self.assembler.kind {
                FractureIntegralKind::J { convert_to_k: true } => {
                    let j = *total;
                    j.signum() * (j.abs() * self.assembler.moduli.plane_strain_modulus()).sqrt()
                }
                FractureIntegralKind::J { convert_to_k: false } => *total,
                FractureIntegralKind::Interaction { k_factor, .. } => *total * k_factor,
            };
        }

        let parameterization = if front.has_angles() {
            FrontParameterization::Angle
        } else {
            FrontParameterization::ArcLength
        };
        let along_front = front
            .points()
            .iter()
            .map(|point| match parameterization {
                FrontParameterization::Angle => point
                    .angle_along_front
                    .unwrap_or(point.distance_along_front),
                FrontParameterization::ArcLength => point.distance_along_front,
            })
            .collect();
        debug!(
            "finalized fracture integral for {} front points",
            front.num_points()
        );
        Ok(FractureReport {
            values: totals.iter().copied().collect(),
            positions: front.points().iter().map(|point| point.position).collect(),
            along_front,
            parameterization,
        })
    }
}

pub struct FractureIntegralEvaluatorBuilder<Front, Domain, Fields, Q, Kind, Moduli> {
    front: Front,
    domain: Domain,
    fields: Fields,
    q_function: Q,
    kind: Kind,
    moduli: Moduli,
}

impl FractureIntegralEvaluatorBuilder<(), (), (), (), (), ()> {
    pub fn new() -> Self {
        Self {
            front: (),
            domain: (),
            fields: (),
            q_function: (),
            kind: (),
            moduli: (),
        }
    }
}

impl<Domain, Fields, Q, Kind, Moduli>
    FractureIntegralEvaluatorBuilder<(), Domain, Fields, Q, Kind, Moduli>
{
    pub fn with_crack_front<T: Scalar>(
        self,
        front: &CrackFront<T>,
    ) -> FractureIntegralEvaluatorBuilder<&CrackFront<T>, Domain, Fields, Q, Kind, Moduli> {
        FractureIntegralEvaluatorBuilder {
            front,
            domain: self.domain,
            fields: self.fields,
            q_function: self.q_function,
            kind: self.kind,
            moduli: self.moduli,
        }
    }
}

impl<Front, Fields, Q, Kind, Moduli>
    FractureIntegralEvaluatorBuilder<Front, (), Fields, Q, Kind, Moduli>
{
    pub fn with_integration_domain<Domain>(
        self,
        domain: &Domain,
    ) -> FractureIntegralEvaluatorBuilder<Front, &Domain, Fields, Q, Kind, Moduli> {
        FractureIntegralEvaluatorBuilder {
            front: self.front,
            domain,
            fields: self.fields,
            q_function: self.q_function,
            kind: self.kind,
            moduli: self.moduli,
        }
    }
}

impl<Front, Domain, Q, Kind, Moduli>
    FractureIntegralEvaluatorBuilder<Front, Domain, (), Q, Kind, Moduli>
{
    pub fn with_quadrature_fields<Fields>(
        self,
        fields: &Fields,
    ) -> FractureIntegralEvaluatorBuilder<Front, Domain, &Fields, Q, Kind, Moduli> {
        FractureIntegralEvaluatorBuilder {
            front: self.front,
            domain: self.domain,
            fields,
            q_function: self.q_function,
            kind: self.kind,
            moduli: self.moduli,
        }
    }
}

impl<Front, Domain, Fields, Kind, Moduli>
    FractureIntegralEvaluatorBuilder<Front, Domain, Fields, (), Kind, Moduli>
{
    pub fn with_q_function<Q>(
        self,
        q_function: &Q,
    ) -> FractureIntegralEvaluatorBuilder<Front, Domain, Fields, &Q, Kind, Moduli> {
        FractureIntegralEvaluatorBuilder {
            front: self.front,
            domain: self.domain,
            fields: self.fields,
            q_function,
            kind: self.kind,
            moduli: self.moduli,
        }
    }
}

impl<Front, Domain, Fields, Q, Moduli>
    FractureIntegralEvaluatorBuilder<Front, Domain, Fields, Q, (), Moduli>
{
    pub fn with_integral_kind<T: Scalar>(
        self,
        kind: FractureIntegralKind<T>,
    ) -> FractureIntegralEvaluatorBuilder<Front, Domain, Fields, Q, FractureIntegralKind<T>, Moduli>
    {
        FractureIntegralEvaluatorBuilder {
            front: self.front,
            domain: self.domain,
            fields: self.fields,
            q_function: self.q_function,
            kind,
            moduli: self.moduli,
        }
    }
}

impl<Front, Domain, Fields, Q, Kind>
    FractureIntegralEvaluatorBuilder<Front, Domain, Fields, Q, Kind, ()>
{
    pub fn with_elastic_moduli<T: Scalar>(
        self,
        moduli: ElasticModuli<T>,
    ) -> FractureIntegralEvaluatorBuilder<Front, Domain, Fields, Q, Kind, ElasticModuli<T>> {
        FractureIntegralEvaluatorBuilder {
            front: self.front,
            domain: self.domain,
            fields: self.fields,
            q_function: self.q_function,
            kind: self.kind,
            moduli,
        }
    }
}

impl<'a, T, Domain, Fields, Q>
    FractureIntegralEvaluatorBuilder<
        &'a CrackFront<T>,
        &'a Domain,
        &'a Fields,
        &'a Q,
        FractureIntegralKind<T>,
        ElasticModuli<T>,
    >
where
    T: Scalar,
{
    pub fn build(self) -> FractureIntegralEvaluator<'a, T, Domain, Fields, Q> {
        FractureIntegralEvaluator {
            assembler: DomainIntegralAssembler {
                front: self.front,
                domain: self.domain,
                fields: self.fields,
                q_function: self.q_function,
                kind: self.kind,
                moduli: self.moduli,
            },
        }
    }
}
