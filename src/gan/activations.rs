use crate::matrix::{functions, Matrix2};
use crate::prelude::*;

pub trait Activation {
    /// Returns activation function at x
    fn call(&self, x: f64) -> f64;
    /// Returns derivative of activation function at the pre-activation x.
    /// For sigmoid this is `sigmoid(x) * (1 - sigmoid(x))`.
    fn derivative(&self, x: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activations {
    /// `max(x, alpha * x)`; an alpha of 0 is a plain ReLU.
    LeakyReLU(f64),
    Sigmoid,
    Tanh,
}

impl Activation for Activations {
    fn call(&self, x: f64) -> f64 {
        use Activations::*;
        match self {
            LeakyReLU(alpha) => functions::leaky_relu_scalar(x, *alpha),
            Sigmoid => functions::sigmoid_scalar(x),
            Tanh => x.tanh(),
        }
    }

    fn derivative(&self, x: f64) -> f64 {
        use Activations::*;
        match self {
            LeakyReLU(alpha) => functions::dleaky_relu_scalar(x, *alpha),
            Sigmoid => functions::dsigmoid_scalar(functions::sigmoid_scalar(x)),
            Tanh => functions::dtanh_scalar(x),
        }
    }
}

impl Activations {
    /// Resolves a configuration tag. `leaky_alpha` is only used by leaky ReLU.
    pub fn parse(name: &str, leaky_alpha: f64) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lrelu" | "leaky_relu" | "leakyrelu" => Ok(Activations::LeakyReLU(leaky_alpha)),
            "sigmoid" => Ok(Activations::Sigmoid),
            "tanh" => Ok(Activations::Tanh),
            _ => Err(Error::UnknownActivation(name.to_string())),
        }
    }

    /// `a = φ(z)`
    pub fn forward_into(&self, a: &mut Matrix2<f64>, z: &Matrix2<f64>) -> Result<()> {
        match self {
            Activations::LeakyReLU(alpha) => functions::leaky_relu_into(a, z, *alpha),
            Activations::Sigmoid => functions::sigmoid_into(a, z),
            Activations::Tanh => functions::tanh_into(a, z),
        }
    }

    /// `dz = da ⊙ φ'(z)` where `z` is the pre-activation the derivative is evaluated at.
    pub fn backward_into(
        &self,
        dz: &mut Matrix2<f64>,
        da: &Matrix2<f64>,
        z: &Matrix2<f64>,
    ) -> Result<()> {
        if da.dim() != z.dim() {
            return dimension_err("activation backward", da.dim(), z.dim());
        }
        if dz.dim() != da.dim() {
            return dimension_err("activation backward", dz.dim(), da.dim());
        }

        let cols = z.cols();
        for r in 0..z.rows() {
            for c in 0..cols {
                dz[(r, c)] = da[(r, c)] * self.derivative(z[(r, c)]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parse_tags() {
        assert_eq!(
            Activations::parse("lrelu", 0.01).unwrap(),
            Activations::LeakyReLU(0.01)
        );
        assert_eq!(
            Activations::parse("Sigmoid", 0.01).unwrap(),
            Activations::Sigmoid
        );
        assert_eq!(Activations::parse("tanh", 0.0).unwrap(), Activations::Tanh);

        let err = Activations::parse("softmax", 0.0);
        assert!(matches!(err, Err(Error::UnknownActivation(name)) if name == "softmax"));
    }

    #[test]
    fn derivatives_at_pre_activation() {
        for x in [-3.0, -0.5, 0.0, 0.5, 3.0] {
            let s = Activations::Sigmoid.call(x);
            assert_abs_diff_eq!(Activations::Sigmoid.derivative(x), s * (1.0 - s), epsilon = 1e-12);

            let t = Activations::Tanh.call(x);
            assert_abs_diff_eq!(Activations::Tanh.derivative(x), 1.0 - t * t, epsilon = 1e-12);

            let expected = if x >= 0.0 { 1.0 } else { 0.2 };
            assert_eq!(Activations::LeakyReLU(0.2).derivative(x), expected);
        }
    }

    #[test]
    fn backward_multiplies_upstream_gradient() {
        let z = Matrix2::from_array([[-1.0, 2.0], [0.5, -0.5]]);
        let da = Matrix2::from_array([[2.0, 2.0], [4.0, -1.0]]);
        let mut dz = Matrix2::new(2, 2);

        Activations::LeakyReLU(0.1)
            .backward_into(&mut dz, &da, &z)
            .unwrap();
        assert_eq!(dz.clone().to_vec(), [[0.2, 2.0], [4.0, -0.1]]);

        let mut wrong = Matrix2::new(1, 2);
        assert!(Activations::Tanh.backward_into(&mut wrong, &da, &z).is_err());
    }

    #[test]
    fn forward_applies_elementwise() {
        let z = Matrix2::from_array([[-1.0, 0.0, 1.0]]);
        let mut a = Matrix2::new(1, 3);

        Activations::Sigmoid.forward_into(&mut a, &z).unwrap();
        assert_abs_diff_eq!(a[(0, 1)], 0.5, epsilon = 1e-12);

        Activations::LeakyReLU(0.0).forward_into(&mut a, &z).unwrap();
        assert_eq!(a.clone().to_vec(), [[0.0, 0.0, 1.0]]);
    }
}
